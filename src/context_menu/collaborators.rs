//! Click context and the external components the menu pipeline talks to
//!
//! Window management, the native menu widget, clipboard/shell access, the
//! spellchecker and the extension runtime all live outside the core. The
//! pipeline only sees them through these traits.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::template::MenuEntry;

/// Identifier of a web-content surface (a page host inside a window)
pub type SurfaceId = u64;
/// Identifier of a top-level window
pub type WindowId = u64;

/// Edit capabilities reported with the right-click
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EditFlags {
    pub can_undo: bool,
    pub can_redo: bool,
    pub can_cut: bool,
    pub can_copy: bool,
    pub can_paste: bool,
    pub can_select_all: bool,
}

/// Kind of media under the cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    None,
    Image,
    Video,
    Audio,
    Canvas,
    File,
    Plugin,
}

impl MediaType {
    /// Label used in "Copy Image Address" style entries
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::Image => Some("Image"),
            Self::Video => Some("Video"),
            Self::Audio => Some("Audio"),
            Self::None | Self::Canvas | Self::File | Self::Plugin => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Canvas => "canvas",
            Self::File => "file",
            Self::Plugin => "plugin",
        }
    }
}

/// Parameters of one native right-click
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClickParams {
    pub x: i32,
    pub y: i32,
    pub link_url: Option<String>,
    pub link_text: Option<String>,
    /// Source URL of the media element under the cursor
    pub src_url: Option<String>,
    pub media_type: MediaType,
    pub page_url: Option<String>,
    pub frame_url: Option<String>,
    pub selection_text: String,
    pub is_editable: bool,
    pub misspelled_word: Option<String>,
    pub edit_flags: EditFlags,
}

impl ClickParams {
    pub fn link(&self) -> Option<&str> {
        non_empty(self.link_url.as_deref())
    }

    pub fn selection(&self) -> Option<&str> {
        non_empty(Some(self.selection_text.trim()))
    }

    pub fn page(&self) -> Option<&str> {
        non_empty(self.page_url.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Suggestions for one dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSuggestions {
    pub language: String,
    pub suggestions: Vec<String>,
}

/// Result of a spelling lookup across the primary and secondary dictionaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpellSuggestions {
    pub primary: LanguageSuggestions,
    pub secondary: Option<LanguageSuggestions>,
}

pub trait Spellchecker: Send {
    /// `None` when the word is spelled correctly or spellchecking is off
    fn spell_suggestions(&self, word: &str) -> Option<SpellSuggestions>;
    fn add_user_word(&mut self, word: &str);
    fn installed_dictionaries(&self) -> Vec<String>;
    fn humanized_language_name(&self, code: &str) -> String;
    fn primary_language(&self) -> Option<String>;
}

/// Where a surface lives, as far as the window manager knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "window_id", rename_all = "snake_case")]
pub enum SurfaceOwner {
    /// The main content surface of a recognized top-level window
    TopLevel(WindowId),
    /// An auxiliary surface (embedded service view, popup content) hosted
    /// by a window
    Hosted(WindowId),
    /// Not attached to any window yet
    Unattached,
}

impl SurfaceOwner {
    pub fn window(self) -> Option<WindowId> {
        match self {
            Self::TopLevel(window) | Self::Hosted(window) => Some(window),
            Self::Unattached => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    Back,
    Forward,
    Reload,
}

pub trait WindowManager: Send {
    fn surface_owner(&self, surface: SurfaceId) -> SurfaceOwner;
    fn is_surface_alive(&self, surface: SurfaceId) -> bool;
    fn can_go_back(&self, surface: SurfaceId) -> bool;
    fn can_go_forward(&self, surface: SurfaceId) -> bool;
    fn open_content_window(&mut self, url: &str, parent: WindowId);
    fn navigate(&mut self, surface: SurfaceId, navigation: Navigation);
    /// Focus the main window and open the settings page
    fn show_settings(&mut self);
    fn inspect_element(&mut self, surface: SurfaceId, x: i32, y: i32);
}

/// Native edit commands handled by the surface itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditRole {
    Undo,
    Redo,
    Cut,
    Copy,
    Paste,
    PasteAndMatchStyle,
    SelectAll,
    LookUp,
}

/// OS-level services: menu widget, clipboard, shell and surface editing
pub trait Platform: Send {
    fn popup_menu(&mut self, window: WindowId, template: &[MenuEntry], x: i32, y: i32);
    fn write_clipboard(&mut self, text: &str);
    fn open_external(&mut self, url: &str);
    fn perform_edit(&mut self, surface: SurfaceId, role: EditRole);
    fn replace_misspelling(&mut self, surface: SurfaceId, word: &str);
}

/// Where an extension item applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MenuContext {
    All,
    Page,
    Editable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionItemKind {
    #[default]
    Normal,
    Checkbox,
    Radio,
    Separator,
}

/// One context-menu item registered by an extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExtensionMenuItem {
    pub menu_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: ExtensionItemKind,
    #[serde(default)]
    pub contexts: BTreeSet<MenuContext>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// All items one extension registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExtensionMenus {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub items: Vec<ExtensionMenuItem>,
}

/// Payload delivered to the extension when one of its items is clicked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionClickPayload {
    pub menu_item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_text: Option<String>,
    pub editable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_checked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

pub trait ExtensionRuntime: Send {
    /// Registered items keyed by extension id. Queried fresh per click.
    fn context_menu_data(&self) -> BTreeMap<String, ExtensionMenus>;
    /// Fire-and-forget selection notification
    fn context_menu_item_selected(
        &mut self,
        extension_id: &str,
        surface: SurfaceId,
        payload: ExtensionClickPayload,
    );
}

/// The external components a [`super::ContextMenuService`] drives
pub struct Collaborators {
    pub spellchecker: Box<dyn Spellchecker>,
    pub windows: Box<dyn WindowManager>,
    pub platform: Box<dyn Platform>,
    pub extensions: Box<dyn ExtensionRuntime>,
}
