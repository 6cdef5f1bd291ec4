use crate::config::Config;

use super::boundary::probe::Boundary;

/// Messages consumed by the tracker task.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// Workspaces, repository heads or branch tracking changed.
    BoundaryCrossed(Boundary),
    /// Configuration file was edited.
    SettingsChanged(Config),
    Toggle,
    Save,
    /// The cli left a [ControlRequest](super::control::ControlRequest) to handle.
    Control,
}
