//! nrfprog-openocd - OpenOCD probe backend
//!
//! This crate drives nRF51/nRF52 targets through a running OpenOCD server
//! using its TCL RPC interface. OpenOCD owns the debug adapter (J-Link,
//! CMSIS-DAP, ST-Link, ...); nrfprog only talks to the server.
//!
//! # Example
//!
//! ```no_run
//! use nrfprog_core::device::{DeviceDatabase, DeviceFamily};
//! use nrfprog_core::probe::ProbeFactory;
//! use nrfprog_openocd::{OpenOcdConfig, OpenOcdFactory};
//!
//! // openocd -f interface/cmsis-dap.cfg -f target/nrf52.cfg
//! let mut factory = OpenOcdFactory::new(OpenOcdConfig::default(), DeviceDatabase::builtin());
//! let probe = factory.create(DeviceFamily::Nrf52)?;
//! # Ok::<(), nrfprog_core::Error>(())
//! ```

pub mod device;
pub mod error;
pub mod protocol;
pub mod transport;

pub use device::{OpenOcd, OpenOcdConfig};
pub use error::{OpenOcdError, Result};
pub use transport::tcp::TcpTransport;

use nrfprog_core::device::{DeviceDatabase, DeviceFamily};
use nrfprog_core::probe::ProbeFactory;

/// Creates one OpenOCD driver per family trial
pub struct OpenOcdFactory {
    config: OpenOcdConfig,
    db: DeviceDatabase,
}

impl OpenOcdFactory {
    /// Create a factory for the given server
    pub fn new(config: OpenOcdConfig, db: DeviceDatabase) -> Self {
        Self { config, db }
    }

    /// Server configuration
    pub fn config(&self) -> &OpenOcdConfig {
        &self.config
    }
}

impl ProbeFactory for OpenOcdFactory {
    type Probe = OpenOcd<TcpTransport>;

    fn create(&mut self, family: DeviceFamily) -> nrfprog_core::Result<Self::Probe> {
        let transport = TcpTransport::new(&self.config.host, self.config.port);
        Ok(OpenOcd::new(
            family,
            self.config.clone(),
            transport,
            self.db.clone(),
        ))
    }
}
