//! Target ISA construction shared by the front end and the JIT

use cranelift_codegen::isa::{self, OwnedTargetIsa, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use thiserror::Error;

use crate::options::OptLevel;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid target triple '{triple}': {message}")]
    InvalidTriple { triple: String, message: String },

    #[error("no code generator for target '{triple}': {message}")]
    Unsupported { triple: String, message: String },

    #[error("host machine is not supported: {0}")]
    HostUnsupported(String),

    #[error("invalid code generator setting: {0}")]
    Setting(String),
}

/// Build the ISA for `target`, or for the host when `None`
pub fn target_isa(target: Option<&str>, opt_level: OptLevel) -> Result<OwnedTargetIsa, TargetError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", opt_level.as_setting())
        .map_err(|e| TargetError::Setting(e.to_string()))?;
    flag_builder
        .set("is_pic", "false")
        .map_err(|e| TargetError::Setting(e.to_string()))?;

    let isa_builder = match target {
        Some(triple) => {
            let parsed = triple
                .parse()
                .map_err(|e| TargetError::InvalidTriple {
                    triple: triple.to_string(),
                    message: format!("{}", e),
                })?;
            isa::lookup(parsed).map_err(|e| TargetError::Unsupported {
                triple: triple.to_string(),
                message: e.to_string(),
            })?
        }
        None => cranelift_native::builder()
            .map_err(|msg| TargetError::HostUnsupported(msg.to_string()))?,
    };

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| TargetError::Setting(e.to_string()))
}

/// Architecture name of an ISA, as it appears first in its triple
pub fn architecture(isa: &dyn TargetIsa) -> String {
    isa.triple().architecture.to_string()
}

/// Whether code generated for `isa` can execute in this process
pub fn runs_on_host(isa: &dyn TargetIsa) -> Result<bool, TargetError> {
    let host = cranelift_native::builder()
        .map_err(|msg| TargetError::HostUnsupported(msg.to_string()))?;
    Ok(host.triple().architecture == isa.triple().architecture)
}
