//! Mailbox and service state types
//!
//! A [`Mailbox`] groups one default [`Service`] and zero or more capability
//! services under shared display and window settings. The mailbox type is
//! derived from its provider profile, so the two can never disagree.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};

/// Provider family of a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MailboxType {
    Generic,
    Google,
    Slack,
    Trello,
    Microsoft,
    Container,
}

impl MailboxType {
    /// Capabilities a service attached to this mailbox type may have.
    /// `Default` is always first.
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Google => &[
                Capability::Default,
                Capability::Communication,
                Capability::Calendar,
                Capability::Messenger,
            ],
            Self::Microsoft => &[Capability::Default, Capability::Storage],
            Self::Generic | Self::Slack | Self::Trello | Self::Container => &[Capability::Default],
        }
    }

    pub fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Google => "google",
            Self::Slack => "slack",
            Self::Trello => "trello",
            Self::Microsoft => "microsoft",
            Self::Container => "container",
        }
    }
}

/// What a service does for its mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The provider's primary service (mail, team chat, boards, ...)
    Default,
    Communication,
    Calendar,
    Messenger,
    Storage,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Communication => "communication",
            Self::Calendar => "calendar",
            Self::Messenger => "messenger",
            Self::Storage => "storage",
        }
    }
}

/// Service type: provider plus capability, e.g. `google/communication`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ServiceType {
    pub provider: MailboxType,
    pub capability: Capability,
}

impl ServiceType {
    pub const fn new(provider: MailboxType, capability: Capability) -> Self {
        Self {
            provider,
            capability,
        }
    }

    pub const fn default_for(provider: MailboxType) -> Self {
        Self::new(provider, Capability::Default)
    }

    /// Whether services of this type report an unread count at all.
    /// Unsupported types always carry `unread_count = None`.
    pub fn supports_unread(self) -> bool {
        !matches!(self.capability, Capability::Calendar | Capability::Storage)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider.as_str(), self.capability.as_str())
    }
}

/// Microsoft account flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MicrosoftAccessMode {
    #[default]
    Outlook,
    Office365,
}

/// Provider-specific mailbox data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MailboxProfile {
    Generic {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        open_windows_externally: bool,
    },
    Google {
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        avatar_url: Option<String>,
        #[serde(default)]
        profile_synced_at: Option<DateTime<Utc>>,
    },
    Slack {
        #[serde(default)]
        team_id: Option<String>,
        #[serde(default)]
        team_name: Option<String>,
        #[serde(default)]
        team_url: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        user_name: Option<String>,
    },
    Trello {
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        full_name: Option<String>,
        #[serde(default)]
        initials: Option<String>,
        #[serde(default)]
        home_board_id: Option<String>,
    },
    Microsoft {
        #[serde(default)]
        access_mode: MicrosoftAccessMode,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        display_name: Option<String>,
    },
    Container {
        container_id: String,
        #[serde(default)]
        url_subdomain: Option<String>,
    },
}

impl MailboxProfile {
    pub fn mailbox_type(&self) -> MailboxType {
        match self {
            Self::Generic { .. } => MailboxType::Generic,
            Self::Google { .. } => MailboxType::Google,
            Self::Slack { .. } => MailboxType::Slack,
            Self::Trello { .. } => MailboxType::Trello,
            Self::Microsoft { .. } => MailboxType::Microsoft,
            Self::Container { .. } => MailboxType::Container,
        }
    }

    /// Empty profile for a freshly created mailbox of the given type.
    /// Container mailboxes need their container id and cannot be blank.
    pub fn blank(mailbox_type: MailboxType) -> AppResult<Self> {
        Ok(match mailbox_type {
            MailboxType::Generic => Self::Generic {
                url: None,
                open_windows_externally: false,
            },
            MailboxType::Google => Self::Google {
                email: None,
                display_name: None,
                avatar_url: None,
                profile_synced_at: None,
            },
            MailboxType::Slack => Self::Slack {
                team_id: None,
                team_name: None,
                team_url: None,
                user_id: None,
                user_name: None,
            },
            MailboxType::Trello => Self::Trello {
                user_id: None,
                username: None,
                full_name: None,
                initials: None,
                home_board_id: None,
            },
            MailboxType::Microsoft => Self::Microsoft {
                access_mode: MicrosoftAccessMode::default(),
                user_id: None,
                email: None,
                display_name: None,
            },
            MailboxType::Container => {
                return Err(AppError::invalid(
                    "container mailboxes require a container_id",
                ));
            }
        })
    }
}

/// A user-configured container of service accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Mailbox {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<String>,
    pub avatar: Option<String>,
    /// Attached service ids in display order
    pub services: Vec<String>,
    pub open_in_background: bool,
    pub show_unread_badge: bool,
    pub profile: MailboxProfile,
}

impl Mailbox {
    pub fn new(id: impl Into<String>, profile: MailboxProfile) -> Self {
        Self {
            id: id.into(),
            name: None,
            color: None,
            avatar: None,
            services: Vec::new(),
            open_in_background: false,
            show_unread_badge: true,
            profile,
        }
    }

    pub fn mailbox_type(&self) -> MailboxType {
        self.profile.mailbox_type()
    }
}

/// A single external-service account attached to a mailbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Service {
    pub id: String,
    pub mailbox_id: String,
    pub service_type: ServiceType,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    /// `None` when the service type has no unread support
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    /// Opaque reference into the `MailboxLinker`
    pub auth_ref: Option<String>,
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        mailbox_id: impl Into<String>,
        service_type: ServiceType,
    ) -> Self {
        Self {
            id: id.into(),
            mailbox_id: mailbox_id.into(),
            service_type,
            display_name: None,
            avatar: None,
            unread_count: service_type.supports_unread().then_some(0),
            settings: BTreeMap::new(),
            auth_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Capability, MailboxProfile, MailboxType, Service, ServiceType};

    #[test]
    fn capability_table_always_starts_with_default() {
        for ty in [
            MailboxType::Generic,
            MailboxType::Google,
            MailboxType::Slack,
            MailboxType::Trello,
            MailboxType::Microsoft,
            MailboxType::Container,
        ] {
            assert_eq!(ty.capabilities().first(), Some(&Capability::Default));
        }
        assert!(MailboxType::Google.supports(Capability::Calendar));
        assert!(MailboxType::Microsoft.supports(Capability::Storage));
        assert!(!MailboxType::Slack.supports(Capability::Storage));
    }

    #[test]
    fn storage_services_start_without_unread_count() {
        let storage = Service::new(
            "s1",
            "m1",
            ServiceType::new(MailboxType::Microsoft, Capability::Storage),
        );
        assert_eq!(storage.unread_count, None);

        let mail = Service::new("s2", "m1", ServiceType::default_for(MailboxType::Microsoft));
        assert_eq!(mail.unread_count, Some(0));
    }

    #[test]
    fn profile_serializes_with_type_tag() {
        let profile = MailboxProfile::blank(MailboxType::Slack).expect("slack profile");
        let value = serde_json::to_value(&profile).expect("serializes");
        assert_eq!(value["type"], "slack");
        assert_eq!(profile.mailbox_type(), MailboxType::Slack);
    }

    #[test]
    fn container_profile_cannot_be_blank() {
        let err = MailboxProfile::blank(MailboxType::Container).expect_err("must fail");
        assert!(err.to_string().contains("container_id"));
    }

    #[test]
    fn service_type_displays_provider_and_capability() {
        let ty = ServiceType::new(MailboxType::Google, Capability::Communication);
        assert_eq!(ty.to_string(), "google/communication");
    }
}
