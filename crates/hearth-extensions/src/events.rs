use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Install pipeline events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallEvent {
    /// An install run started
    InstallStarted {
        install_id: String,
        archive: String,
    },

    /// The pipeline entered a new state
    StateChanged {
        install_id: String,
        state: String,
    },

    /// Installation completed successfully
    InstallCompleted {
        install_id: String,
        extension_id: String,
        version: String,
        duration_ms: u64,
        manifest_only: bool,
        #[serde(default)]
        registry_stale: bool,
    },

    /// Installation failed or was canceled
    InstallFailed {
        install_id: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        extension_id: Option<String>,
        error_message: String,
        duration_ms: u64,
        canceled: bool,
    },

    /// A declared dependency is being installed before its dependent
    DependencyInstalling {
        install_id: String,
        dependent: String,
        dependency: String,
    },

    /// A declared dependency is neither installed nor in the catalog
    DependencyMissing {
        install_id: String,
        dependent: String,
        dependency: String,
    },

    /// An extension was removed
    Removed { extension_id: String },
}

impl InstallEvent {
    pub fn install_id(&self) -> Option<&str> {
        match self {
            Self::InstallStarted { install_id, .. }
            | Self::StateChanged { install_id, .. }
            | Self::InstallCompleted { install_id, .. }
            | Self::InstallFailed { install_id, .. }
            | Self::DependencyInstalling { install_id, .. }
            | Self::DependencyMissing { install_id, .. } => Some(install_id),
            Self::Removed { .. } => None,
        }
    }
}

/// Event metadata envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID (UUID v4)
    pub event_id: String,

    /// Event timestamp (UTC)
    pub timestamp: DateTime<Utc>,

    /// The actual event payload
    pub event: InstallEvent,
}

impl EventEnvelope {
    pub fn new(event: InstallEvent) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_serialization() {
        let event = InstallEvent::StateChanged {
            install_id: "abc".to_string(),
            state: "settling".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"state_changed"#));
        assert!(json.contains(r#""state":"settling"#));
    }

    #[test]
    fn test_install_failed_omits_unknown_extension() {
        let event = InstallEvent::InstallFailed {
            install_id: "abc".to_string(),
            extension_id: None,
            error_message: "invalid extension data: no entry".to_string(),
            duration_ms: 12,
            canceled: false,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("extension_id"));

        let deserialized: InstallEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn test_envelope_has_unique_ids() {
        let a = EventEnvelope::new(InstallEvent::Removed {
            extension_id: "foo".to_string(),
        });
        let b = EventEnvelope::new(a.event.clone());
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.event.install_id(), None);
    }
}
