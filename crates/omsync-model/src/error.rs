use crate::mode::MachineMode;

/// Errors raised while interpreting object-model content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// `state.machineMode` holds a mode this library does not know.
    #[error("unknown machine mode '{0}'")]
    UnknownMachineMode(String),

    /// The mode is known but no key set is configured for it.
    #[error("machine mode {0} is not supported by the configured key map")]
    UnsupportedMachineMode(MachineMode),
}

pub type Result<T> = std::result::Result<T, ModelError>;
