// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration files for vSphere clients
//!
//! # Environment Variables
//!
//! The following environment variables are supported:
//!
//! - `VSPHERECONFIG` - Path to the config file (default: `~/.vsphere/config`)
//! - `VSPHERE_CONTEXT` - Override the active context
//! - `VSPHERE_ENDPOINT` - Override the endpoint of the active context
//! - `VSPHERE_DATACENTER` - Override the datacenter of the active context
//!
//! # Example
//!
//! ```no_run
//! use vsphere_api_rs::config::VsphereConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VsphereConfig::load_with_env()?;
//!
//! if let Some(ctx) = config.active_context() {
//!     println!("Using {} in {}", ctx.endpoint, ctx.datacenter);
//!     let _client_config = ctx.client_config();
//! }
//! # Ok(())
//! # }
//! ```

mod vsphereconfig;

pub use vsphereconfig::{
    VsphereConfig, VsphereContext, ENV_VSPHERECONFIG, ENV_VSPHERE_CONTEXT,
    ENV_VSPHERE_DATACENTER, ENV_VSPHERE_ENDPOINT,
};
