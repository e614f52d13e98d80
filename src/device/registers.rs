// src/device/registers.rs
//! ADS1299 register plan derived from a validated session config.
use crate::config::Config;

pub const CONFIG1: u8 = 0x01;
pub const CONFIG1_CONST: u8 = 0x90;
pub const CONFIG2: u8 = 0x02;
pub const CONFIG2_CONST: u8 = 0xC0;
/// CONFIG2 INT_CAL with the slowest test frequency (about 4 Hz at 500 sps).
pub const INT_TEST_4HZ: u8 = 0x10;
pub const CH_N_SET: u8 = 0x04;
pub const MISC1: u8 = 0x15;
pub const MISC1_CONST: u8 = 0x00;

pub const ELECTRODE_INPUT: u8 = 0x00;
pub const SHORTED: u8 = 0x01;
pub const TEST_SIGNAL: u8 = 0x05;
pub const POWER_DOWN: u8 = 0x80;

/// CH1SET..CH8SET
pub const MAX_CHANNELS: usize = 8;

/// Allowed sample rates and their CONFIG1 data-rate bits.
pub const SPEEDS: [(u32, u8); 7] = [
    (250, 0x06),
    (500, 0x05),
    (1024, 0x04),
    (2048, 0x03),
    (4096, 0x02),
    (8192, 0x01),
    (16384, 0x00),
];

/// Allowed PGA gains and their CHnSET gain bits.
pub const GAINS: [(u32, u8); 7] = [
    (1, 0x00),
    (2, 0x10),
    (4, 0x20),
    (6, 0x30),
    (8, 0x40),
    (12, 0x50),
    (24, 0x60),
];

pub fn speed_bits(samples_per_second: u32) -> Option<u8> {
    SPEEDS
        .iter()
        .find(|(sps, _)| *sps == samples_per_second)
        .map(|(_, bits)| *bits)
}

pub fn gain_bits(gain: u32) -> Option<u8> {
    GAINS
        .iter()
        .find(|(g, _)| *g == gain)
        .map(|(_, bits)| *bits)
}

pub fn allowed_speeds() -> String {
    join_keys(&SPEEDS)
}

pub fn allowed_gains() -> String {
    join_keys(&GAINS)
}

fn join_keys(table: &[(u32, u8)]) -> String {
    let keys: Vec<String> = table.iter().map(|(k, _)| k.to_string()).collect();
    format!("[{}]", keys.join(", "))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterWrite {
    pub register: u8,
    pub value: u8,
}

/// Ordered write sequence for one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterPlan {
    pub writes: Vec<RegisterWrite>,
}

impl RegisterPlan {
    /// Expects a config that already passed `Config::validate`; unknown rate or
    /// gain values and channel counts past `MAX_CHANNELS` yield `None`.
    pub fn from_config(config: &Config) -> Option<Self> {
        let speed = speed_bits(config.sample_rate)?;
        let gain = gain_bits(config.gain)?;
        if config.channel_count > MAX_CHANNELS {
            return None;
        }
        let selected = config.selected_channels();
        let mut writes = vec![RegisterWrite {
            register: CONFIG1,
            value: speed | CONFIG1_CONST,
        }];
        let input = if config.test_signal {
            writes.push(RegisterWrite {
                register: CONFIG2,
                value: INT_TEST_4HZ | CONFIG2_CONST,
            });
            TEST_SIGNAL
        } else {
            ELECTRODE_INPUT
        };
        for channel in 0..config.channel_count {
            let value = if selected.contains(&channel) {
                input | gain
            } else {
                POWER_DOWN | SHORTED
            };
            writes.push(RegisterWrite {
                register: channel_register(channel)?,
                value,
            });
        }
        writes.push(RegisterWrite {
            register: MISC1,
            value: MISC1_CONST,
        });
        Some(Self { writes })
    }
}

/// CHnSET address of the 0-based `channel`.
fn channel_register(channel: usize) -> Option<u8> {
    let offset = u8::try_from(channel).ok()?.checked_add(1)?;
    CH_N_SET.checked_add(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_encodes_rate_and_gain() {
        let config = Config {
            sample_rate: 1024,
            gain: 24,
            channels: vec![1, 3],
            ..Config::default()
        };
        let plan = RegisterPlan::from_config(&config).unwrap();
        assert_eq!(plan.writes[0], RegisterWrite { register: CONFIG1, value: 0x94 });
        assert_eq!(plan.writes[1].value, 0x60);
        assert_eq!(plan.writes[2].value, POWER_DOWN | SHORTED);
        assert_eq!(plan.writes[3].value, 0x60);
        assert_eq!(plan.writes.len(), config.channel_count + 2);
    }

    #[test]
    fn unknown_rate_has_no_plan() {
        let config = Config {
            sample_rate: 300,
            ..Config::default()
        };
        assert!(RegisterPlan::from_config(&config).is_none());
    }

    #[test]
    fn too_many_channels_have_no_plan() {
        for channel_count in [9, 252, 300] {
            let config = Config {
                channel_count,
                ..Config::default()
            };
            assert!(RegisterPlan::from_config(&config).is_none());
        }
        assert_eq!(channel_register(7), Some(0x0C));
        assert_eq!(channel_register(usize::from(u8::MAX)), None);
    }

    #[test]
    fn test_signal_plan_routes_internal_source() {
        let config = Config {
            test_signal: true,
            channels: vec![1, 2],
            ..Config::default()
        };
        let plan = RegisterPlan::from_config(&config).unwrap();
        assert_eq!(plan.writes[1], RegisterWrite { register: CONFIG2, value: 0xD0 });
        assert_eq!(plan.writes[2], RegisterWrite { register: 0x05, value: TEST_SIGNAL });
        assert_eq!(plan.writes[4].value, POWER_DOWN | SHORTED);
        assert_eq!(plan.writes.len(), config.channel_count + 3);
    }
}
