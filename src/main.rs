// src/main.rs
use std::env;
use std::io::{self, BufRead};
use std::thread;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use biostream::device::{SerialDevice, SimulatedDevice};
use biostream::engine::StopSignal;
use biostream::{Config, Session};

// 入口函数：唯一参数为 JSON 配置文件
fn main() -> Result<()> {
    env_logger::init();
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: biostream <config.json>");
    };
    let config = Config::from_json_file(&path)
        .with_context(|| format!("loading config from {path}"))?;

    let session = if config.port == "sim" {
        let device = SimulatedDevice::new(config.channel_count, config.sample_rate);
        Session::start(config, device)?
    } else {
        let device = SerialDevice::connect(&config.port, config.baud_rate)
            .with_context(|| format!("opening {}", config.port))?;
        Session::start(config, device)?
    };
    run(session)
}

fn run(mut session: Session) -> Result<()> {
    if session.config().acquisition.continuous {
        info!("streaming continuously, press Enter to stop");
        watch_stdin(session.stop_signal());
    }
    if let Err(e) = session.run() {
        // run 出错时会话已经停止
        warn!("streaming ended early: {e}");
        return Err(e.into());
    }
    let summary = session.stop()?;
    info!("{summary}");
    println!("{summary}");
    Ok(())
}

fn watch_stdin(stop: StopSignal) {
    let spawned = thread::Builder::new()
        .name("stdin-stop".to_owned())
        .spawn(move || {
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
            stop.raise();
        });
    if let Err(e) = spawned {
        warn!("cannot watch stdin, stop with Ctrl+C: {e}");
    }
}
