//! This module contains the [MachineConfig], which describes the virtual machine the tunnel serves.

use crate::{errors::ConfigError, HookParams, UnknownCallPolicy};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

/// Default capacity of the guest socket handle table.
pub const DEFAULT_MAX_HANDLES: usize = 256;

/// The machine configuration, loaded from a JSON document. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Host paths of the virtual files, addressed by the guest through their position here.
    pub files: Vec<PathBuf>,
    /// The kernel hook, applied on every readiness signal while armed.
    pub kernel_hook: HookParams,
    /// Hooks applied once, on the first readiness signal.
    pub hook_funcs: Vec<HookParams>,
    /// Treatment of call numbers the tunnel does not recognize.
    pub unknown_calls: UnknownCallPolicy,
    /// Capacity of the guest socket handle table.
    pub max_handles: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            kernel_hook: HookParams::default(),
            hook_funcs: Vec::new(),
            unknown_calls: UnknownCallPolicy::default(),
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }
}

impl MachineConfig {
    /// Load and validate a configuration file. Relative virtual file paths are resolved against
    /// the directory holding the configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut cfg: Self = serde_json::from_slice(&fs::read(path)?)?;

        if let Some(dir) = path.parent() {
            cfg.files = cfg.files.into_iter().map(|f| dir.join(f)).collect();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the configuration for values no machine can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_handles == 0 || i32::try_from(self.max_handles).is_err() {
            return Err(ConfigError::Invalid(format!(
                "max_handles must be in 1..={}, got {}",
                i32::MAX,
                self.max_handles
            )));
        }

        let hooks = std::iter::once(&self.kernel_hook).chain(&self.hook_funcs);
        for (i, hook) in hooks.enumerate().filter(|(_, h)| h.is_armed()) {
            if hook.scratch_reg > 30 {
                return Err(ConfigError::Invalid(format!(
                    "hook {i} at {:#x} uses x{} as scratch register",
                    hook.va, hook.scratch_reg
                )));
            }
        }

        Ok(())
    }

    /// Number of hooks that will be applied on the first readiness signal.
    pub fn armed_hooks(&self) -> usize {
        usize::from(self.kernel_hook.is_armed()) + self.hook_funcs.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg: MachineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, MachineConfig::default());
        assert_eq!(cfg.max_handles, 256);
        assert_eq!(cfg.unknown_calls, UnknownCallPolicy::Ignore);
        assert!(!cfg.kernel_hook.is_armed());
        assert_eq!(cfg.armed_hooks(), 0);
    }

    #[test]
    fn test_full_document() {
        let cfg: MachineConfig = serde_json::from_str(
            r#"{
                "files": ["disk0.img", "/abs/disk1.img"],
                "kernel_hook": { "va": 4096, "pa": 4096, "buf_va": 8192, "buf_pa": 8192, "buf_size": 64 },
                "hook_funcs": [{ "va": 12288 }, { "va": 16384, "scratch_reg": 9 }],
                "unknown_calls": "reject",
                "max_handles": 16
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.files.len(), 2);
        assert_eq!(cfg.kernel_hook.buf_size, 64);
        assert_eq!(cfg.hook_funcs[1].scratch_reg, 9);
        assert_eq!(cfg.unknown_calls, UnknownCallPolicy::Reject);
        assert_eq!(cfg.max_handles, 16);
        assert_eq!(cfg.armed_hooks(), 3);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = serde_json::from_str::<MachineConfig>(r#"{ "max_handle": 4 }"#).unwrap_err();
        assert!(err.to_string().contains("max_handle"));
    }

    #[test]
    fn test_validate() {
        let cfg = MachineConfig { max_handles: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let hook = HookParams { va: 0x1000, scratch_reg: 31, ..Default::default() };
        let cfg = MachineConfig { hook_funcs: vec![hook.clone()], ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        // A disarmed hook is not checked.
        let cfg = MachineConfig {
            kernel_hook: HookParams { va: 0, ..hook },
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(br#"{ "files": ["disk0.img", "/abs/disk1.img"] }"#).unwrap();

        let cfg = MachineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.files, vec![dir.path().join("disk0.img"), PathBuf::from("/abs/disk1.img")]);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MachineConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(MachineConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }
}
