//! Container (packaged web app) mailbox and service reducers

use serde::Deserialize;
use serde_json::Value;

use super::service::with_setting;
use super::{ReducerSet, clean, decode, profile_mismatch};
use crate::errors::{AppError, AppResult};
use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service};

pub static MAILBOX_REDUCERS: ReducerSet<Mailbox> = ReducerSet {
    name: "container_mailbox",
    actions: &[("container.set_url_subdomain", set_url_subdomain)],
};

pub static DEFAULT_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "container_service",
    actions: &[("container_service.set_url", set_url)],
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SubdomainPayload {
    subdomain: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UrlPayload {
    url: Option<String>,
}

/// Subdomains are a single DNS label: lowercase alphanumerics and hyphens
fn set_url_subdomain(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: SubdomainPayload = decode("container.set_url_subdomain", payload)?;
    let subdomain = clean(p.subdomain).map(|s| s.to_ascii_lowercase());
    if let Some(label) = &subdomain {
        let valid = label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(AppError::invalid(format!(
                "invalid container subdomain '{label}'"
            )));
        }
    }

    let mut next = mailbox.clone();
    let MailboxProfile::Container { url_subdomain, .. } = &mut next.profile else {
        return Err(profile_mismatch(mailbox, MailboxType::Container));
    };
    *url_subdomain = subdomain;
    Ok(Some(next))
}

fn set_url(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: UrlPayload = decode("container_service.set_url", payload)?;
    Ok(Some(with_setting(
        service,
        "url",
        clean(p.url).map(Value::String),
    )))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::set_url_subdomain;
    use crate::mailbox::{Mailbox, MailboxProfile};

    fn container_mailbox() -> Mailbox {
        Mailbox::new(
            "m1",
            MailboxProfile::Container {
                container_id: "jira".to_owned(),
                url_subdomain: None,
            },
        )
    }

    #[test]
    fn subdomain_is_lowercased() {
        let next = set_url_subdomain(&container_mailbox(), &json!({ "subdomain": "AcmeCorp" }))
            .expect("ok")
            .expect("changed");
        assert_eq!(
            next.profile,
            MailboxProfile::Container {
                container_id: "jira".to_owned(),
                url_subdomain: Some("acmecorp".to_owned()),
            }
        );
    }

    #[test]
    fn subdomain_rejects_dots_and_edge_hyphens() {
        for bad in ["evil.com", "-acme", "acme-"] {
            let err = set_url_subdomain(&container_mailbox(), &json!({ "subdomain": bad }))
                .expect_err("must fail");
            assert!(err.to_string().contains("invalid container subdomain"));
        }
    }
}
