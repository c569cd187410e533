//! Compile options for the front-end driver

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What the driver produces from a successful compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmissionKind {
    /// Keep the IR resident and hand it over directly
    #[default]
    InMemory,
    /// Serialize IR to text, then re-parse it
    IrText,
    /// Serialize IR to the binary container, then re-parse it
    IrBinary,
    /// Native object code; no IR module is produced
    Object,
    /// Assembly text; no IR module is produced
    Assembly,
}

impl EmissionKind {
    pub const ALL: [EmissionKind; 5] = [
        EmissionKind::InMemory,
        EmissionKind::IrText,
        EmissionKind::IrBinary,
        EmissionKind::Object,
        EmissionKind::Assembly,
    ];

    /// Returns true when compilation yields an IR module
    #[must_use]
    pub const fn produces_module(self) -> bool {
        matches!(
            self,
            EmissionKind::InMemory | EmissionKind::IrText | EmissionKind::IrBinary
        )
    }
}

impl fmt::Display for EmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmissionKind::InMemory => "in-memory",
            EmissionKind::IrText => "ir-text",
            EmissionKind::IrBinary => "ir-binary",
            EmissionKind::Object => "object",
            EmissionKind::Assembly => "assembly",
        })
    }
}

/// Code-generation optimization tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting
    #[must_use]
    pub const fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Code model requested for the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodeModel {
    #[default]
    Default,
    Small,
    Kernel,
    Medium,
    Large,
}

impl CodeModel {
    /// Cranelift only generates code for the default (small) model
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, CodeModel::Default | CodeModel::Small)
    }
}

impl fmt::Display for CodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodeModel::Default => "default",
            CodeModel::Small => "small",
            CodeModel::Kernel => "kernel",
            CodeModel::Medium => "medium",
            CodeModel::Large => "large",
        })
    }
}

/// Which header sets `#include` may reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderSearchPolicy {
    pub use_builtin_includes: bool,
    pub use_standard_system_includes: bool,
    pub use_standard_cxx_includes: bool,
}

impl HeaderSearchPolicy {
    /// No builtin headers at all; only caller-supplied headers resolve
    #[must_use]
    pub const fn none() -> Self {
        Self {
            use_builtin_includes: false,
            use_standard_system_includes: false,
            use_standard_cxx_includes: false,
        }
    }
}

impl Default for HeaderSearchPolicy {
    fn default() -> Self {
        Self {
            use_builtin_includes: true,
            use_standard_system_includes: true,
            use_standard_cxx_includes: true,
        }
    }
}

/// Options for one front-end compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Target triple; `None` targets the host
    pub target: Option<String>,
    pub code_model: CodeModel,
    pub opt_level: OptLevel,
    pub emission: EmissionKind,
    pub headers: HeaderSearchPolicy,
    /// Record warnings as errors (`-Werror`)
    pub warnings_as_errors: bool,
    /// Name given to the produced module
    pub module_name: String,
    /// In-memory headers reachable through `#include`
    pub virtual_headers: BTreeMap<String, String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: None,
            code_model: CodeModel::Default,
            opt_level: OptLevel::None,
            emission: EmissionKind::InMemory,
            headers: HeaderSearchPolicy::default(),
            warnings_as_errors: false,
            module_name: "snippet".to_string(),
            virtual_headers: BTreeMap::new(),
        }
    }
}

impl CompileOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_target(mut self, triple: impl Into<String>) -> Self {
        self.target = Some(triple.into());
        self
    }

    #[must_use]
    pub fn with_code_model(mut self, code_model: CodeModel) -> Self {
        self.code_model = code_model;
        self
    }

    #[must_use]
    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    #[must_use]
    pub fn with_emission(mut self, emission: EmissionKind) -> Self {
        self.emission = emission;
        self
    }

    #[must_use]
    pub fn with_header_policy(mut self, headers: HeaderSearchPolicy) -> Self {
        self.headers = headers;
        self
    }

    /// Make an in-memory header available to `#include`
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.virtual_headers.insert(name.into(), text.into());
        self
    }

    #[must_use]
    pub fn warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    #[must_use]
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }
}
