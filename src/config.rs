//! Typed radio configuration and the AT command script it renders to.

use crate::error::ConfigError;

/// Baud rates the transceiver's UART accepts.
pub const SUPPORTED_BAUD_RATES: [u32; 8] = [9600, 14400, 19200, 38400, 57600, 76800, 115200, 230400];
/// Default UART baud rate, matching the ground-station default.
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Whether the radio should log at its own `AT+LOG` verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LogVerbosity {
    Quiet,
    Debug,
}

impl LogVerbosity {
    fn as_at_token(self) -> &'static str {
        match self {
            LogVerbosity::Quiet => "QUIET",
            LogVerbosity::Debug => "DEBUG",
        }
    }
}

/// Validated radio-frequency parameters for one session.
///
/// All fields are checked against the ranges in the AT shell's contract at
/// construction time, so a `RfConfig` can never render an out-of-range
/// `AT+TEST=RFCFG` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RfConfig {
    pub frequency_mhz: u32,
    pub spreading_factor: u32,
    pub bandwidth_khz: u32,
    pub power_dbm: u32,
    pub baud_rate: u32,
    pub verbosity: LogVerbosity,
}

impl RfConfig {
    pub fn new(
        frequency_mhz: u32,
        spreading_factor: u32,
        bandwidth_khz: u32,
        power_dbm: u32,
        baud_rate: u32,
        verbosity: LogVerbosity,
    ) -> Result<Self, ConfigError> {
        if !(6..=14).contains(&spreading_factor) {
            return Err(ConfigError::SpreadingFactorOutOfRange(spreading_factor));
        }
        if bandwidth_khz != 250 && bandwidth_khz != 500 {
            return Err(ConfigError::UnsupportedBandwidth(bandwidth_khz));
        }
        if !(13..=22).contains(&power_dbm) {
            return Err(ConfigError::PowerOutOfRange(power_dbm));
        }
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(ConfigError::UnsupportedBaudRate(baud_rate));
        }
        Ok(RfConfig {
            frequency_mhz,
            spreading_factor,
            bandwidth_khz,
            power_dbm,
            baud_rate,
            verbosity,
        })
    }

    /// Renders the configuration as the line-oriented AT command script the
    /// radio expects, one command per line, in send order.
    pub fn command_script(&self) -> Vec<String> {
        vec![
            format!("AT+LOG={}", self.verbosity.as_at_token()),
            format!("AT+UART=BR, {}", self.baud_rate),
            "AT+MODE=TEST".to_string(),
            format!(
                "AT+TEST=RFCFG,{},SF{},{},12,15,{},ON,OFF,OFF",
                self.frequency_mhz, self.spreading_factor, self.bandwidth_khz, self.power_dbm
            ),
        ]
    }
}
