//! The `harrislrc` dialect's own config bag, nested under a driver's
//! `[drivers.config]` table in the process config (see `router_core::config`).

use router_core::RouterError;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarrisLrcConfig {
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct RawHarrisLrcConfig {
    hostname: Option<String>,
    port: Option<i64>,
}

pub fn parse_config(raw: &toml::Value) -> Result<HarrisLrcConfig, RouterError> {
    let raw: RawHarrisLrcConfig = raw
        .clone()
        .try_into()
        .map_err(|e| RouterError::Config(format!("harrislrc config: {e}")))?;

    let hostname = raw
        .hostname
        .ok_or_else(|| RouterError::Config("harrislrc config missing 'hostname'".to_owned()))?;
    if hostname.is_empty() {
        return Err(RouterError::Config(
            "harrislrc config 'hostname' must not be empty".to_owned(),
        ));
    }

    let port = raw
        .port
        .ok_or_else(|| RouterError::Config("harrislrc config missing 'port'".to_owned()))?;
    let port = u16::try_from(port)
        .map_err(|_| RouterError::Config(format!("harrislrc config 'port' {port} out of range")))?;

    Ok(HarrisLrcConfig { hostname, port })
}
