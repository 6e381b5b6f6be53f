//! In-process collaborators for running the core without a desktop shell
//!
//! The MCP server has no native windows, widgets or clipboard. These
//! implementations keep the state the front end reports over IPC (which
//! surfaces exist and who owns them, registered extension menus) and record
//! every side effect the menu pipeline asks for in an [`EffectLog`], which
//! the server hands back to the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::context_menu::collaborators::{
    Collaborators, EditRole, ExtensionClickPayload, ExtensionMenus, ExtensionRuntime,
    LanguageSuggestions, Navigation, Platform, SpellSuggestions, Spellchecker, SurfaceId,
    SurfaceOwner, WindowId, WindowManager,
};
use crate::context_menu::template::{MenuEntry, outline};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A side effect requested by the menu pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    Popup {
        window: WindowId,
        items: Vec<String>,
        x: i32,
        y: i32,
    },
    ClipboardWrite {
        text: String,
    },
    OpenExternal {
        url: String,
    },
    OpenContentWindow {
        url: String,
        parent: WindowId,
    },
    Edit {
        surface: SurfaceId,
        role: EditRole,
    },
    ReplaceMisspelling {
        surface: SurfaceId,
        word: String,
    },
    Navigate {
        surface: SurfaceId,
        navigation: Navigation,
    },
    ShowSettings,
    InspectElement {
        surface: SurfaceId,
        x: i32,
        y: i32,
    },
    AddUserWord {
        word: String,
    },
    ExtensionItemSelected {
        extension_id: String,
        surface: SurfaceId,
        payload: ExtensionClickPayload,
    },
}

/// Shared, append-only record of effects; drained by the caller
#[derive(Debug, Clone, Default)]
pub struct EffectLog {
    inner: Arc<Mutex<Vec<Effect>>>,
}

impl EffectLog {
    pub fn push(&self, effect: Effect) {
        lock(&self.inner).push(effect);
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<Effect> {
        std::mem::take(&mut *lock(&self.inner))
    }
}

#[derive(Debug, Clone, Copy)]
struct SurfaceRecord {
    owner: SurfaceOwner,
    can_go_back: bool,
    can_go_forward: bool,
}

/// Surface table fed by IPC lifecycle events
#[derive(Debug, Clone)]
pub struct HeadlessWindows {
    surfaces: Arc<Mutex<HashMap<SurfaceId, SurfaceRecord>>>,
    effects: EffectLog,
}

impl HeadlessWindows {
    pub fn new(effects: EffectLog) -> Self {
        Self {
            surfaces: Arc::default(),
            effects,
        }
    }

    /// Record (or update) which window owns a surface
    pub fn attach(&self, surface: SurfaceId, owner: SurfaceOwner) {
        let mut surfaces = lock(&self.surfaces);
        let record = surfaces.entry(surface).or_insert(SurfaceRecord {
            owner,
            can_go_back: false,
            can_go_forward: false,
        });
        record.owner = owner;
    }

    pub fn set_history(&self, surface: SurfaceId, can_go_back: bool, can_go_forward: bool) {
        if let Some(record) = lock(&self.surfaces).get_mut(&surface) {
            record.can_go_back = can_go_back;
            record.can_go_forward = can_go_forward;
        }
    }

    /// Forget a destroyed surface. Unknown surfaces read as dead and
    /// unattached, which is all a late click needs to see.
    pub fn destroy(&self, surface: SurfaceId) -> bool {
        lock(&self.surfaces).remove(&surface).is_some()
    }

    /// Surfaces currently tracked
    pub fn surface_count(&self) -> usize {
        lock(&self.surfaces).len()
    }

    fn record(&self, surface: SurfaceId) -> Option<SurfaceRecord> {
        lock(&self.surfaces).get(&surface).copied()
    }
}

impl WindowManager for HeadlessWindows {
    fn surface_owner(&self, surface: SurfaceId) -> SurfaceOwner {
        self.record(surface)
            .map_or(SurfaceOwner::Unattached, |record| record.owner)
    }

    fn is_surface_alive(&self, surface: SurfaceId) -> bool {
        lock(&self.surfaces).contains_key(&surface)
    }

    fn can_go_back(&self, surface: SurfaceId) -> bool {
        self.record(surface).is_some_and(|record| record.can_go_back)
    }

    fn can_go_forward(&self, surface: SurfaceId) -> bool {
        self.record(surface)
            .is_some_and(|record| record.can_go_forward)
    }

    fn open_content_window(&mut self, url: &str, parent: WindowId) {
        self.effects.push(Effect::OpenContentWindow {
            url: url.to_owned(),
            parent,
        });
    }

    fn navigate(&mut self, surface: SurfaceId, navigation: Navigation) {
        self.effects.push(Effect::Navigate {
            surface,
            navigation,
        });
    }

    fn show_settings(&mut self) {
        self.effects.push(Effect::ShowSettings);
    }

    fn inspect_element(&mut self, surface: SurfaceId, x: i32, y: i32) {
        self.effects.push(Effect::InspectElement { surface, x, y });
    }
}

/// Records widget, clipboard, shell and edit requests
#[derive(Debug, Clone)]
pub struct HeadlessPlatform {
    effects: EffectLog,
}

impl Platform for HeadlessPlatform {
    fn popup_menu(&mut self, window: WindowId, template: &[MenuEntry], x: i32, y: i32) {
        self.effects.push(Effect::Popup {
            window,
            items: outline(template).into_iter().map(str::to_owned).collect(),
            x,
            y,
        });
    }

    fn write_clipboard(&mut self, text: &str) {
        self.effects.push(Effect::ClipboardWrite {
            text: text.to_owned(),
        });
    }

    fn open_external(&mut self, url: &str) {
        self.effects.push(Effect::OpenExternal {
            url: url.to_owned(),
        });
    }

    fn perform_edit(&mut self, surface: SurfaceId, role: EditRole) {
        self.effects.push(Effect::Edit { surface, role });
    }

    fn replace_misspelling(&mut self, surface: SurfaceId, word: &str) {
        self.effects.push(Effect::ReplaceMisspelling {
            surface,
            word: word.to_owned(),
        });
    }
}

/// Suggestions the renderer computed for the word under the last click
#[derive(Debug, Default)]
struct SpellState {
    user_words: BTreeSet<String>,
    /// Lowercased misspelled word and its suggestions per dictionary
    offered: Option<(String, BTreeMap<String, Vec<String>>)>,
}

/// Spellchecker over the configured dictionaries plus a user word list.
///
/// The renderer reports per-dictionary suggestions with each right-click;
/// they are held for that click only, so the table never outgrows one word.
/// Clones share state, so the server's handle feeds the instance the menu
/// service owns.
#[derive(Debug, Clone)]
pub struct DictionarySpellchecker {
    /// Installed dictionaries, primary first
    languages: Vec<String>,
    state: Arc<Mutex<SpellState>>,
    effects: EffectLog,
}

impl DictionarySpellchecker {
    pub fn new(languages: Vec<String>, effects: EffectLog) -> Self {
        Self {
            languages,
            state: Arc::default(),
            effects,
        }
    }

    /// Replace the suggestions offered for the current click. `None` (no
    /// misspelled word) clears them.
    pub fn offer_suggestions(
        &self,
        word: Option<&str>,
        by_language: &BTreeMap<String, Vec<String>>,
    ) {
        lock(&self.state).offered = word.map(|word| (word.to_lowercase(), by_language.clone()));
    }

    fn lookup(&self, state: &SpellState, language: &str, word: &str) -> LanguageSuggestions {
        let suggestions = state
            .offered
            .as_ref()
            .filter(|(offered, _)| *offered == word.to_lowercase())
            .and_then(|(_, by_language)| by_language.get(language))
            .cloned()
            .unwrap_or_default();
        LanguageSuggestions {
            language: language.to_owned(),
            suggestions,
        }
    }
}

impl Spellchecker for DictionarySpellchecker {
    fn spell_suggestions(&self, word: &str) -> Option<SpellSuggestions> {
        let state = lock(&self.state);
        if state.user_words.contains(&word.to_lowercase()) {
            return None;
        }
        let primary = self.languages.first()?;
        Some(SpellSuggestions {
            primary: self.lookup(&state, primary, word),
            secondary: self
                .languages
                .get(1)
                .map(|lang| self.lookup(&state, lang, word)),
        })
    }

    fn add_user_word(&mut self, word: &str) {
        lock(&self.state).user_words.insert(word.to_lowercase());
        self.effects.push(Effect::AddUserWord {
            word: word.to_owned(),
        });
    }

    fn installed_dictionaries(&self) -> Vec<String> {
        self.languages.clone()
    }

    fn humanized_language_name(&self, code: &str) -> String {
        let language = code.split(['_', '-']).next().unwrap_or(code);
        let name = match language.to_ascii_lowercase().as_str() {
            "en" => "English",
            "de" => "German",
            "fr" => "French",
            "es" => "Spanish",
            "it" => "Italian",
            "nl" => "Dutch",
            "pt" => "Portuguese",
            "sv" => "Swedish",
            "da" => "Danish",
            "nb" | "no" => "Norwegian",
            "pl" => "Polish",
            "ru" => "Russian",
            _ => return code.to_owned(),
        };
        name.to_owned()
    }

    fn primary_language(&self) -> Option<String> {
        self.languages.first().cloned()
    }
}

/// Extension menus pushed over IPC by the extension host
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    menus: Arc<Mutex<BTreeMap<String, ExtensionMenus>>>,
    effects: EffectLog,
}

impl ExtensionRegistry {
    pub fn new(effects: EffectLog) -> Self {
        Self {
            menus: Arc::default(),
            effects,
        }
    }

    /// Replace all items registered by one extension; an empty item list
    /// removes the extension
    pub fn set_menus(&self, extension_id: &str, menus: ExtensionMenus) {
        let mut registered = lock(&self.menus);
        if menus.items.is_empty() {
            registered.remove(extension_id);
        } else {
            registered.insert(extension_id.to_owned(), menus);
        }
    }

    pub fn extension_count(&self) -> usize {
        lock(&self.menus).len()
    }
}

impl ExtensionRuntime for ExtensionRegistry {
    fn context_menu_data(&self) -> BTreeMap<String, ExtensionMenus> {
        lock(&self.menus).clone()
    }

    fn context_menu_item_selected(
        &mut self,
        extension_id: &str,
        surface: SurfaceId,
        payload: ExtensionClickPayload,
    ) {
        self.effects.push(Effect::ExtensionItemSelected {
            extension_id: extension_id.to_owned(),
            surface,
            payload,
        });
    }
}

/// Handles to the shared headless state plus a factory for the boxed
/// collaborators a menu service owns
#[derive(Debug, Clone)]
pub struct Headless {
    pub windows: HeadlessWindows,
    pub extensions: ExtensionRegistry,
    pub spelling: DictionarySpellchecker,
    pub effects: EffectLog,
}

impl Headless {
    pub fn new(languages: Vec<String>, effects: EffectLog) -> Self {
        Self {
            windows: HeadlessWindows::new(effects.clone()),
            extensions: ExtensionRegistry::new(effects.clone()),
            spelling: DictionarySpellchecker::new(languages, effects.clone()),
            effects,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            spellchecker: Box::new(self.spelling.clone()),
            windows: Box::new(self.windows.clone()),
            platform: Box::new(HeadlessPlatform {
                effects: self.effects.clone(),
            }),
            extensions: Box::new(self.extensions.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{DictionarySpellchecker, EffectLog, HeadlessWindows};
    use crate::context_menu::collaborators::{Spellchecker, SurfaceOwner, WindowManager};

    #[test]
    fn destroyed_surfaces_lose_their_window() {
        let windows = HeadlessWindows::new(EffectLog::default());
        windows.attach(1, SurfaceOwner::Hosted(4));
        assert_eq!(windows.surface_owner(1), SurfaceOwner::Hosted(4));
        assert!(windows.destroy(1));
        assert!(!windows.is_surface_alive(1));
        assert_eq!(windows.surface_owner(1), SurfaceOwner::Unattached);
        assert!(!windows.is_surface_alive(99));
        assert!(!windows.destroy(99));
    }

    #[test]
    fn surface_churn_does_not_grow_the_table() {
        let windows = HeadlessWindows::new(EffectLog::default());
        windows.attach(1, SurfaceOwner::TopLevel(1));
        for surface in 100..1_100 {
            windows.attach(surface, SurfaceOwner::Hosted(1));
            windows.set_history(surface, true, false);
            windows.destroy(surface);
        }
        assert_eq!(windows.surface_count(), 1);
        assert!(windows.is_surface_alive(1));
    }

    #[test]
    fn offered_suggestions_apply_to_their_word_only() {
        let checker = DictionarySpellchecker::new(
            vec!["en_US".to_owned(), "de_DE".to_owned()],
            EffectLog::default(),
        );
        let offered = BTreeMap::from([
            ("en_US".to_owned(), vec!["the".to_owned()]),
            ("de_DE".to_owned(), vec!["geh".to_owned()]),
        ]);
        checker.offer_suggestions(Some("Teh"), &offered);

        let found = checker.spell_suggestions("teh").expect("misspelled");
        assert_eq!(found.primary.suggestions, vec!["the"]);
        assert_eq!(found.secondary.expect("secondary").suggestions, vec!["geh"]);
        let other = checker.spell_suggestions("wrod").expect("misspelled");
        assert!(other.primary.suggestions.is_empty());

        checker.offer_suggestions(None, &BTreeMap::new());
        let cleared = checker.spell_suggestions("teh").expect("misspelled");
        assert!(cleared.primary.suggestions.is_empty());
    }

    #[test]
    fn user_words_are_no_longer_misspelled() {
        let effects = EffectLog::default();
        let mut checker = DictionarySpellchecker::new(vec!["en_GB".to_owned()], effects.clone());
        assert!(checker.spell_suggestions("Wavebox").is_some());
        checker.add_user_word("Wavebox");
        assert!(checker.spell_suggestions("wavebox").is_none());
        assert_eq!(effects.take().len(), 1);
        assert!(effects.take().is_empty());
    }

    #[test]
    fn language_names_fall_back_to_code() {
        let checker = DictionarySpellchecker::new(Vec::new(), EffectLog::default());
        assert_eq!(checker.humanized_language_name("de_DE"), "German");
        assert_eq!(checker.humanized_language_name("pt-BR"), "Portuguese");
        assert_eq!(checker.humanized_language_name("xx_YY"), "xx_YY");
        assert!(checker.spell_suggestions("anything").is_none());
        assert_eq!(checker.primary_language(), None);
    }
}
