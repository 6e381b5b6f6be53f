//! Context-menu construction pipeline
//!
//! [`ContextMenuService`] owns one menu at a time and walks it through
//! `Idle -> Building -> Displaying -> TornDown -> Idle`. Building runs every
//! section builder in a fixed order, assembles the template and hands it to
//! the platform widget. A click or the grace timer after the widget closes
//! tears it down.
//!
//! Surface binding is separate: surfaces are bound at most once through the
//! two-phase [`binding::SurfaceBinder`], and only bound surfaces produce
//! menus. Binding events are only accepted between [`ContextMenuService::start`]
//! and [`ContextMenuService::shutdown`].

pub mod binding;
pub mod collaborators;
pub mod extensions;
pub mod sections;
pub mod template;

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MenuConfig;
use crate::errors::{AppError, AppResult};

use binding::{Binding, SurfaceBinder};
use collaborators::{ClickParams, Collaborators, SurfaceId, WindowId};
use sections::SectionInput;
use template::{MenuCommand, MenuEntry};

/// Lifecycle phase of the current menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuPhase {
    Idle,
    Building,
    Displaying,
    TornDown,
}

/// A menu on screen and the click that produced it
#[derive(Debug)]
struct Presentation {
    surface: SurfaceId,
    window: WindowId,
    params: ClickParams,
    template: Vec<MenuEntry>,
    /// Set once the widget reports the menu closed
    teardown_at: Option<Instant>,
}

/// What a selection did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectOutcome {
    Executed,
    /// Item exists but is disabled or informational
    Inert,
    /// The originating surface was gone; nothing ran
    SurfaceDestroyed,
}

pub struct ContextMenuService {
    config: MenuConfig,
    teardown_grace: Duration,
    phase: MenuPhase,
    current: Option<Presentation>,
    binder: SurfaceBinder,
    listening: bool,
    collaborators: Collaborators,
}

impl ContextMenuService {
    pub fn new(
        config: MenuConfig,
        teardown_grace: Duration,
        binding_ttl: Duration,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            teardown_grace,
            phase: MenuPhase::Idle,
            current: None,
            binder: SurfaceBinder::new(binding_ttl),
            listening: false,
            collaborators,
        }
    }

    /// Begin accepting surface lifecycle events. Idempotent.
    pub fn start(&mut self) {
        if !self.listening {
            self.listening = true;
            info!("context menu service listening for surfaces");
        }
    }

    /// Stop accepting surface events, tear down any open menu and forget
    /// all bindings
    pub fn shutdown(&mut self) {
        self.teardown("shutdown");
        self.binder.clear();
        if self.listening {
            self.listening = false;
            info!("context menu service stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn phase(&self) -> MenuPhase {
        self.phase
    }

    /// Template of the menu currently displayed
    #[cfg(test)]
    pub fn current_template(&self) -> Option<&[MenuEntry]> {
        self.current.as_ref().map(|p| p.template.as_slice())
    }

    pub fn binder(&self) -> &SurfaceBinder {
        &self.binder
    }

    /// A new surface exists; register the intent to bind it
    pub fn surface_created(&mut self, surface: SurfaceId, now: Instant) -> bool {
        if !self.listening {
            debug!(surface, "surface created before start; ignored");
            return false;
        }
        self.binder.register_intent(surface, now)
    }

    /// The surface's window attachment has completed; bind it if it has a
    /// pending intent
    pub fn surface_attached(&mut self, surface: SurfaceId, now: Instant) -> Option<Binding> {
        if !self.listening {
            return None;
        }
        let owner = self.collaborators.windows.surface_owner(surface);
        let binding = self.binder.confirm(surface, owner, now)?;
        debug!(surface, window = binding.window, kind = ?binding.kind, "bound context menu");
        Some(binding)
    }

    pub fn surface_destroyed(&mut self, surface: SurfaceId) -> bool {
        let removed = self.binder.unbind(surface);
        if removed {
            debug!(surface, "unbound context menu");
        }
        removed
    }

    /// Build and show a menu for a right-click on `surface`.
    ///
    /// Returns the displayed template, or `None` when nothing was shown:
    /// the surface is not bound, or it has no owning window (the soft
    /// `MissingWindowContext` case). Any menu still displayed is torn down
    /// first.
    pub fn launch_menu(
        &mut self,
        surface: SurfaceId,
        params: ClickParams,
    ) -> AppResult<Option<&[MenuEntry]>> {
        if !self.binder.is_bound(surface) {
            debug!(surface, "right-click on unbound surface ignored");
            return Ok(None);
        }
        self.teardown("superseded");

        let Some(window) = self.collaborators.windows.surface_owner(surface).window() else {
            let err = AppError::MissingWindowContext(surface.to_string());
            warn!(error = %err, "menu build aborted");
            return Ok(None);
        };

        self.phase = MenuPhase::Building;
        let template = self.build(surface, &params);
        if template.is_empty() {
            self.phase = MenuPhase::Idle;
            return Ok(None);
        }
        debug!(surface, window, items = ?template::outline(&template), "showing context menu");
        self.collaborators
            .platform
            .popup_menu(window, &template, params.x, params.y);
        self.phase = MenuPhase::Displaying;
        let presentation = self.current.insert(Presentation {
            surface,
            window,
            params,
            template,
            teardown_at: None,
        });
        Ok(Some(presentation.template.as_slice()))
    }

    fn build(&self, surface: SurfaceId, params: &ClickParams) -> Vec<MenuEntry> {
        let input = SectionInput {
            surface,
            params,
            config: &self.config,
            spellchecker: self.collaborators.spellchecker.as_ref(),
            windows: self.collaborators.windows.as_ref(),
        };
        template::assemble(vec![
            sections::spelling(&input),
            sections::url(&input),
            sections::lookup(&input),
            sections::history(&input),
            sections::editing(&input),
            sections::navigation(&input),
            sections::external(&input),
            extensions::render_extension_section(self.collaborators.extensions.as_ref(), params),
            sections::app_settings(&input),
        ])
    }

    /// The widget reported the menu closed; start the teardown grace timer.
    /// Returns the deadline, or `None` when no menu is displayed.
    pub fn menu_closed(&mut self, now: Instant) -> Option<Instant> {
        let grace = self.teardown_grace;
        let presentation = self.current.as_mut()?;
        let deadline = *presentation.teardown_at.get_or_insert(now + grace);
        Some(deadline)
    }

    /// Tear down the displayed menu if its grace period has elapsed
    pub fn tick(&mut self, now: Instant) -> bool {
        let expired = self
            .current
            .as_ref()
            .and_then(|p| p.teardown_at)
            .is_some_and(|deadline| deadline <= now);
        if expired {
            self.teardown("grace elapsed");
        }
        expired
    }

    /// Handle a click on item `item_id` of the displayed menu. The menu is
    /// torn down before the command runs.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if no menu is displayed
    /// - `NotFound` if the item is not part of the displayed menu
    pub fn select(&mut self, item_id: &str) -> AppResult<SelectOutcome> {
        let Some(presentation) = self.current.as_ref() else {
            return Err(AppError::invalid("no context menu is displayed"));
        };
        let item = template::find_item(&presentation.template, item_id)
            .ok_or_else(|| AppError::not_found(format!("menu item '{item_id}'")))?;
        let command = item.command.clone().filter(|_| item.enabled);

        let Some(Presentation {
            surface,
            window,
            params,
            ..
        }) = self.take_presentation("selected")
        else {
            return Err(AppError::invalid("no context menu is displayed"));
        };
        let Some(command) = command else {
            return Ok(SelectOutcome::Inert);
        };

        if command.targets_surface() && !self.collaborators.windows.is_surface_alive(surface) {
            let err = AppError::DestroyedSurface(surface.to_string());
            warn!(error = %err, "click handler skipped");
            return Ok(SelectOutcome::SurfaceDestroyed);
        }
        self.execute(command, surface, window, &params);
        Ok(SelectOutcome::Executed)
    }

    fn execute(
        &mut self,
        command: MenuCommand,
        surface: SurfaceId,
        window: WindowId,
        params: &ClickParams,
    ) {
        let Collaborators {
            spellchecker,
            windows,
            platform,
            extensions,
        } = &mut self.collaborators;
        match command {
            MenuCommand::ReplaceMisspelling { word } => platform.replace_misspelling(surface, &word),
            MenuCommand::AddToDictionary { word } => spellchecker.add_user_word(&word),
            MenuCommand::OpenLink { url } => windows.open_content_window(&url, window),
            MenuCommand::OpenExternal { url } => platform.open_external(&url),
            MenuCommand::CopyText { text } => platform.write_clipboard(&text),
            MenuCommand::Edit(role) => platform.perform_edit(surface, role),
            MenuCommand::Navigate(navigation) => windows.navigate(surface, navigation),
            MenuCommand::Extension {
                extension_id,
                menu_item_id,
                kind,
                was_checked,
            } => {
                let payload = extensions::click_payload(&menu_item_id, kind, was_checked, params);
                extensions.context_menu_item_selected(&extension_id, surface, payload);
            }
            MenuCommand::InspectElement { x, y } => windows.inspect_element(surface, x, y),
            MenuCommand::ShowSettings => windows.show_settings(),
        }
    }

    fn take_presentation(&mut self, reason: &str) -> Option<Presentation> {
        let presentation = self.current.take()?;
        self.phase = MenuPhase::TornDown;
        debug!(surface = presentation.surface, reason, "context menu torn down");
        self.phase = MenuPhase::Idle;
        Some(presentation)
    }

    fn teardown(&mut self, reason: &str) {
        self.take_presentation(reason);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::{Duration, Instant};

    use super::{ContextMenuService, MenuPhase, SelectOutcome};
    use crate::config::MenuConfig;
    use crate::context_menu::collaborators::{
        ClickParams, ExtensionItemKind, ExtensionMenuItem, ExtensionMenus, MenuContext,
        SurfaceOwner,
    };
    use crate::context_menu::template::{MenuEntry, find_item, outline};
    use crate::headless::{Effect, EffectLog, Headless};

    struct Harness {
        service: ContextMenuService,
        headless: Headless,
        effects: EffectLog,
        now: Instant,
    }

    fn harness() -> Harness {
        let effects = EffectLog::default();
        let headless = Headless::new(vec!["en_US".to_owned()], effects.clone());
        let mut service = ContextMenuService::new(
            MenuConfig {
                lookup_enabled: false,
                ..MenuConfig::default()
            },
            Duration::from_millis(100),
            Duration::from_secs(5),
            headless.collaborators(),
        );
        service.start();
        let now = Instant::now();
        headless.windows.attach(10, SurfaceOwner::TopLevel(1));
        service.surface_created(10, now);
        service.surface_attached(10, now).expect("bound");
        Harness {
            service,
            headless,
            effects,
            now,
        }
    }

    fn item_id(template: &[MenuEntry], label: &str) -> String {
        fn walk<'a>(entries: &'a [MenuEntry], label: &str) -> Option<&'a str> {
            entries.iter().find_map(|e| match e {
                MenuEntry::Item(item) if item.label == label => Some(item.id.as_str()),
                MenuEntry::Item(item) => walk(&item.submenu, label),
                MenuEntry::Separator => None,
            })
        }
        walk(template, label).expect("label present").to_owned()
    }

    #[test]
    fn link_click_builds_sections_in_order() {
        let mut h = harness();
        let params = ClickParams {
            link_url: Some("https://example.com".to_owned()),
            page_url: Some("https://mail.example.com".to_owned()),
            ..ClickParams::default()
        };
        let template = h
            .service
            .launch_menu(10, params)
            .expect("launch")
            .expect("menu shown");
        assert_eq!(
            outline(template),
            vec![
                "Open Link",
                "Open Link in Browser",
                "Copy Link Address",
                "-",
                "Copy Current Page URL",
                "Open Page in Browser",
                "-",
                "Settings",
            ]
        );
        assert_eq!(h.service.phase(), MenuPhase::Displaying);
        assert!(matches!(h.effects.take().first(), Some(Effect::Popup { window: 1, .. })));
    }

    #[test]
    fn selecting_runs_command_and_tears_down() {
        let mut h = harness();
        let params = ClickParams {
            link_url: Some("https://example.com".to_owned()),
            ..ClickParams::default()
        };
        let template = h.service.launch_menu(10, params).expect("launch").expect("menu");
        let copy = item_id(template, "Copy Link Address");
        h.effects.take();

        let outcome = h.service.select(&copy).expect("select");
        assert_eq!(outcome, SelectOutcome::Executed);
        assert_eq!(h.service.phase(), MenuPhase::Idle);
        assert!(h.service.current_template().is_none());
        assert_eq!(
            h.effects.take(),
            vec![Effect::ClipboardWrite {
                text: "https://example.com".to_owned()
            }]
        );
        assert!(h.service.select(&copy).is_err());
    }

    #[test]
    fn open_link_targets_owning_window() {
        let mut h = harness();
        let params = ClickParams {
            link_url: Some("https://example.com".to_owned()),
            ..ClickParams::default()
        };
        let template = h.service.launch_menu(10, params).expect("launch").expect("menu");
        let open = item_id(template, "Open Link");
        h.effects.take();
        h.service.select(&open).expect("select");
        assert_eq!(
            h.effects.take(),
            vec![Effect::OpenContentWindow {
                url: "https://example.com".to_owned(),
                parent: 1
            }]
        );
    }

    #[test]
    fn grace_timer_starts_when_menu_closes() {
        let mut h = harness();
        h.service
            .launch_menu(10, ClickParams::default())
            .expect("launch")
            .expect("menu");
        assert!(!h.service.tick(h.now + Duration::from_secs(10)));

        let deadline = h.service.menu_closed(h.now).expect("displayed");
        assert_eq!(deadline, h.now + Duration::from_millis(100));
        assert!(!h.service.tick(h.now + Duration::from_millis(50)));
        assert_eq!(h.service.phase(), MenuPhase::Displaying);
        assert!(h.service.tick(h.now + Duration::from_millis(100)));
        assert_eq!(h.service.phase(), MenuPhase::Idle);
    }

    #[test]
    fn new_launch_supersedes_displayed_menu() {
        let mut h = harness();
        let first = h
            .service
            .launch_menu(10, ClickParams::default())
            .expect("launch")
            .expect("menu");
        let back = item_id(first, "Back");
        let params = ClickParams {
            selection_text: "hello".to_owned(),
            ..ClickParams::default()
        };
        let second = h.service.launch_menu(10, params).expect("launch").expect("menu");
        assert!(!outline(second).contains(&"Back"));
        assert!(find_item(second, &back).is_some_and(|item| item.label != "Back"));

        let popups = h
            .effects
            .take()
            .into_iter()
            .filter(|e| matches!(e, Effect::Popup { .. }))
            .count();
        assert_eq!(popups, 2);
        assert_eq!(h.service.phase(), MenuPhase::Displaying);
    }

    #[test]
    fn missing_window_aborts_without_menu() {
        let mut h = harness();
        h.headless.windows.attach(11, SurfaceOwner::TopLevel(2));
        h.service.surface_created(11, h.now);
        h.service.surface_attached(11, h.now).expect("bound");
        h.headless.windows.attach(11, SurfaceOwner::Unattached);

        let shown = h.service.launch_menu(11, ClickParams::default()).expect("soft");
        assert!(shown.is_none());
        assert_eq!(h.service.phase(), MenuPhase::Idle);
        assert!(h.effects.take().is_empty());
    }

    #[test]
    fn unbound_surface_gets_no_menu() {
        let mut h = harness();
        h.headless.windows.attach(12, SurfaceOwner::TopLevel(1));
        assert!(
            h.service
                .launch_menu(12, ClickParams::default())
                .expect("soft")
                .is_none()
        );
    }

    #[test]
    fn destroyed_surface_click_is_a_no_op() {
        let mut h = harness();
        h.headless.extensions.set_menus(
            "ext-1",
            ExtensionMenus {
                name: "Clipper".to_owned(),
                icon: None,
                items: vec![ExtensionMenuItem {
                    menu_id: "save".to_owned(),
                    title: "Save page".to_owned(),
                    kind: ExtensionItemKind::Normal,
                    contexts: BTreeSet::from([MenuContext::Page]),
                    checked: false,
                    enabled: true,
                }],
            },
        );
        let template = h
            .service
            .launch_menu(10, ClickParams::default())
            .expect("launch")
            .expect("menu");
        let save = item_id(template, "Save page");
        h.effects.take();

        h.headless.windows.destroy(10);
        h.service.surface_destroyed(10);
        let outcome = h.service.select(&save).expect("soft");
        assert_eq!(outcome, SelectOutcome::SurfaceDestroyed);
        assert!(h.effects.take().is_empty());
    }

    #[test]
    fn extension_checkbox_click_forwards_state() {
        let mut h = harness();
        h.headless.extensions.set_menus(
            "ext-1",
            ExtensionMenus {
                name: "Reader".to_owned(),
                icon: None,
                items: vec![ExtensionMenuItem {
                    menu_id: "dark".to_owned(),
                    title: "Dark mode".to_owned(),
                    kind: ExtensionItemKind::Checkbox,
                    contexts: BTreeSet::from([MenuContext::All]),
                    checked: false,
                    enabled: true,
                }],
            },
        );
        let template = h
            .service
            .launch_menu(10, ClickParams::default())
            .expect("launch")
            .expect("menu");
        let dark = item_id(template, "Dark mode");
        h.effects.take();
        h.service.select(&dark).expect("select");

        let effects = h.effects.take();
        let [Effect::ExtensionItemSelected {
            extension_id,
            surface,
            payload,
        }] = effects.as_slice()
        else {
            panic!("expected one extension effect, got {effects:?}");
        };
        assert_eq!(extension_id, "ext-1");
        assert_eq!(*surface, 10);
        assert_eq!(payload.was_checked, Some(false));
        assert_eq!(payload.checked, Some(true));
    }

    #[test]
    fn add_to_dictionary_reaches_spellchecker() {
        let mut h = harness();
        let params = ClickParams {
            is_editable: true,
            misspelled_word: Some("wavebox".to_owned()),
            ..ClickParams::default()
        };
        let template = h.service.launch_menu(10, params.clone()).expect("launch").expect("menu");
        let add = item_id(template, "Add to Dictionary");
        h.service.select(&add).expect("select");

        let template = h.service.launch_menu(10, params).expect("launch").expect("menu");
        assert!(!outline(template).contains(&"Add to Dictionary"));
    }

    #[test]
    fn disabled_item_is_inert() {
        let mut h = harness();
        let template = h
            .service
            .launch_menu(10, ClickParams::default())
            .expect("launch")
            .expect("menu");
        let back = item_id(template, "Back");
        assert_eq!(h.service.select(&back).expect("select"), SelectOutcome::Inert);
        assert_eq!(h.service.phase(), MenuPhase::Idle);
    }

    #[test]
    fn events_before_start_are_ignored() {
        let effects = EffectLog::default();
        let headless = Headless::new(vec!["en_US".to_owned()], effects);
        let mut service = ContextMenuService::new(
            MenuConfig::default(),
            Duration::from_millis(100),
            Duration::from_secs(5),
            headless.collaborators(),
        );
        assert!(!service.surface_created(1, Instant::now()));
        service.start();
        assert!(service.surface_created(1, Instant::now()));
        service.shutdown();
        assert!(!service.is_listening());
        assert_eq!(service.binder().pending_count(), 0);
    }
}
