//! Probe backend registration and dispatch
//!
//! Backends are feature-gated. A probe is selected with a string of the form
//! `name` or `name:key=value,key=value`; the keys are backend specific.

use std::collections::HashMap;

use nrfprog_core::device::{DeviceDatabase, DeviceFamily};
use nrfprog_core::probe::{ProbeDriver, ProbeFactory, ProbeInfo};

/// Probe driver with the backend erased
pub type DynProbe = Box<dyn ProbeDriver>;

/// Get information about all available probe backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_probes() -> Vec<ProbeInfo> {
    let mut probes = Vec::new();

    #[cfg(feature = "openocd")]
    probes.push(ProbeInfo {
        name: "openocd",
        aliases: &["ocd"],
        description: "Running OpenOCD server over TCL RPC (host=<h>,port=<p>,dap=<name>)",
    });

    #[cfg(feature = "dummy")]
    probes.push(ProbeInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "In-memory nRF5x emulator for testing (family=<f>,version=<v>,snr=<n>)",
    });

    probes
}

/// Generate a short list of probe names for CLI help
pub fn probe_names_short() -> String {
    let names: Vec<&str> = available_probes().iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Parsed probe selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeParams {
    /// Backend name as given
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

impl ProbeParams {
    fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[cfg(feature = "openocd")]
    fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse a probe string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_probe_params(s: &str) -> Result<ProbeParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                );
            }
        }
    }

    Ok(ProbeParams {
        name: name.to_string(),
        params,
    })
}

/// Factory for the selected backend
pub enum Backend {
    /// Emulated target
    #[cfg(feature = "dummy")]
    Dummy(nrfprog_dummy::DummyProbeFactory),
    /// OpenOCD server
    #[cfg(feature = "openocd")]
    OpenOcd(nrfprog_openocd::OpenOcdFactory),
}

impl ProbeFactory for Backend {
    type Probe = DynProbe;

    #[allow(unused_variables, unreachable_patterns)]
    fn create(&mut self, family: DeviceFamily) -> nrfprog_core::Result<DynProbe> {
        match self {
            #[cfg(feature = "dummy")]
            Backend::Dummy(factory) => Ok(Box::new(factory.create(family)?)),
            #[cfg(feature = "openocd")]
            Backend::OpenOcd(factory) => Ok(Box::new(factory.create(family)?)),
        }
    }
}

/// Build the factory for a probe string
pub fn open_backend(probe: &str, db: &DeviceDatabase) -> Result<Backend, Box<dyn std::error::Error>> {
    let params = parse_probe_params(probe)?;

    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" | "emulator" => open_dummy(&params, db),

        #[cfg(feature = "openocd")]
        "openocd" | "ocd" => open_openocd(&params, db),

        _ => Err(unknown_probe_error(&params.name)),
    }
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &ProbeParams, db: &DeviceDatabase) -> Result<Backend, Box<dyn std::error::Error>> {
    use nrfprog_core::device::DeviceVersion;
    use nrfprog_dummy::{DummyConfig, DummyProbeFactory};

    for key in params.params.keys() {
        if !matches!(key.as_str(), "family" | "version" | "snr") {
            return Err(format!("Unknown dummy parameter: {}", key).into());
        }
    }

    let version = match (params.get("version"), params.get("family")) {
        (Some(version), _) => version.to_string(),
        (None, Some(family)) => match crate::cli::parse_family(family)? {
            DeviceFamily::Nrf51 => "NRF51_XLR3P".to_string(),
            DeviceFamily::Nrf52 => "NRF52832_xxAA_REV1".to_string(),
        },
        (None, None) => "NRF52832_xxAA_REV1".to_string(),
    };

    let mut config = DummyConfig::for_version(&version);
    // Extra descriptors loaded with --device-db take precedence
    if let Some(d) = db.lookup(&DeviceVersion::new(&version)) {
        config.family = d.family;
        config.flash_size = d.flash_size;
        config.ram_size = d.ram_size;
        config.page_size = d.page_size;
    }
    if let Some(family) = params.get("family") {
        let family = crate::cli::parse_family(family)?;
        if family != config.family {
            return Err(format!("{} is not an {} device", version, family).into());
        }
    }
    if let Some(snr) = params.get("snr") {
        let snr = crate::cli::parse_hex_u32(snr)?;
        config.serials = vec![snr];
    }

    log::info!("Using emulated {} ({})", version, config.family);
    let factory = DummyProbeFactory::new(config)
        .ok_or_else(|| format!("Invalid emulated geometry for {}", version))?;
    Ok(Backend::Dummy(factory))
}

#[cfg(feature = "openocd")]
fn open_openocd(params: &ProbeParams, db: &DeviceDatabase) -> Result<Backend, Box<dyn std::error::Error>> {
    use nrfprog_openocd::{OpenOcdConfig, OpenOcdFactory};

    let config = OpenOcdConfig::from_params(params.pairs())
        .map_err(|e| format!("Invalid openocd parameters: {}", e))?;
    log::debug!("Using OpenOCD at {}:{}", config.host, config.port);
    Ok(Backend::OpenOcd(OpenOcdFactory::new(config, db.clone())))
}

fn unknown_probe_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown probe: {}\n\nAvailable probes:\n", name);
    for p in available_probes() {
        msg.push_str(&format!("  {:10} - {}\n", p.name, p.description));
    }
    msg.push_str("\nUse 'nrfprog list-probes' for more details");
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_params() {
        let p = parse_probe_params("openocd:host=10.0.0.2,port=7777").unwrap();
        assert_eq!(p.name, "openocd");
        assert_eq!(p.get("host"), Some("10.0.0.2"));
        assert_eq!(p.get("port"), Some("7777"));

        let p = parse_probe_params("dummy").unwrap();
        assert_eq!(p.name, "dummy");
        assert!(p.params.is_empty());

        assert!(parse_probe_params("dummy:family").is_err());
    }

    #[test]
    fn test_unknown_probe() {
        let db = DeviceDatabase::builtin();
        assert!(open_backend("jlink", &db).is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_backend_params() {
        let db = DeviceDatabase::builtin();
        let backend = open_backend("dummy:family=nrf51,snr=0x10", &db).unwrap();
        match backend {
            Backend::Dummy(factory) => {
                let target = factory.target();
                let target = target.borrow();
                assert_eq!(target.config().family, DeviceFamily::Nrf51);
                assert_eq!(target.config().version, "NRF51_XLR3P");
                assert_eq!(target.config().serials, vec![0x10]);
            }
            #[allow(unreachable_patterns)]
            _ => panic!("expected the dummy backend"),
        }

        assert!(open_backend("dummy:family=nrf51,version=NRF52_FP1", &db).is_err());
        assert!(open_backend("dummy:speed=1", &db).is_err());
    }
}
