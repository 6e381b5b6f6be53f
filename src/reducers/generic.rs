//! Generic (any web page) mailbox and service reducers

use serde::Deserialize;
use serde_json::{Value, json};

use super::mailbox::TogglePayload;
use super::service::with_setting;
use super::{ReducerSet, clean, decode, profile_mismatch};
use crate::errors::{AppError, AppResult};
use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service};

pub static MAILBOX_REDUCERS: ReducerSet<Mailbox> = ReducerSet {
    name: "generic_mailbox",
    actions: &[
        ("generic.set_url", set_url),
        (
            "generic.set_open_windows_externally",
            set_open_windows_externally,
        ),
    ],
};

pub static DEFAULT_SERVICE_REDUCERS: ReducerSet<Service> = ReducerSet {
    name: "generic_service",
    actions: &[
        ("generic_service.set_page_title", set_page_title),
        ("generic_service.set_use_page_title", set_use_page_title),
    ],
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UrlPayload {
    url: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TitlePayload {
    title: Option<String>,
}

fn set_url(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: UrlPayload = decode("generic.set_url", payload)?;
    let url = clean(p.url);
    if let Some(url) = &url {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(AppError::invalid("generic mailbox url must be http(s)"));
        }
    }
    let mut next = mailbox.clone();
    let MailboxProfile::Generic { url: current, .. } = &mut next.profile else {
        return Err(profile_mismatch(mailbox, MailboxType::Generic));
    };
    *current = url;
    Ok(Some(next))
}

fn set_open_windows_externally(mailbox: &Mailbox, payload: &Value) -> AppResult<Option<Mailbox>> {
    let p: TogglePayload = decode("generic.set_open_windows_externally", payload)?;
    let mut next = mailbox.clone();
    let MailboxProfile::Generic {
        open_windows_externally,
        ..
    } = &mut next.profile
    else {
        return Err(profile_mismatch(mailbox, MailboxType::Generic));
    };
    *open_windows_externally = p.value;
    Ok(Some(next))
}

/// Page title reported by the loaded document; only shown when
/// `use_page_title` is on
fn set_page_title(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: TitlePayload = decode("generic_service.set_page_title", payload)?;
    Ok(Some(with_setting(
        service,
        "page_title",
        clean(p.title).map(Value::String),
    )))
}

fn set_use_page_title(service: &Service, payload: &Value) -> AppResult<Option<Service>> {
    let p: TogglePayload = decode("generic_service.set_use_page_title", payload)?;
    Ok(Some(with_setting(service, "use_page_title", Some(json!(p.value)))))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{set_page_title, set_url};
    use crate::mailbox::{Mailbox, MailboxProfile, MailboxType, Service, ServiceType};

    #[test]
    fn set_url_accepts_http_urls_only() {
        let mailbox = Mailbox::new(
            "m1",
            MailboxProfile::blank(MailboxType::Generic).expect("profile"),
        );
        let next = set_url(&mailbox, &json!({ "url": "https://example.com" }))
            .expect("ok")
            .expect("changed");
        assert!(matches!(
            next.profile,
            MailboxProfile::Generic { url: Some(ref u), .. } if u == "https://example.com"
        ));

        let err = set_url(&mailbox, &json!({ "url": "file:///etc/passwd" })).expect_err("must fail");
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn blank_page_title_removes_setting() {
        let service = Service::new("s1", "m1", ServiceType::default_for(MailboxType::Generic));
        let titled = set_page_title(&service, &json!({ "title": "Inbox (3)" }))
            .expect("ok")
            .expect("changed");
        assert_eq!(titled.settings.get("page_title"), Some(&json!("Inbox (3)")));

        let cleared = set_page_title(&titled, &json!({ "title": " " }))
            .expect("ok")
            .expect("changed");
        assert!(cleared.settings.get("page_title").is_none());
    }
}
