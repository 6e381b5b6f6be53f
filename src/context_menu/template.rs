//! Menu template entries and section assembly

use serde::Serialize;

use super::collaborators::{EditRole, ExtensionItemKind, Navigation};

/// What happens when an item is clicked. Executed by the menu service
/// against the surface and window the menu was launched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    ReplaceMisspelling { word: String },
    AddToDictionary { word: String },
    /// Open in a new content window owned by the launching window
    OpenLink { url: String },
    OpenExternal { url: String },
    CopyText { text: String },
    Edit(EditRole),
    Navigate(Navigation),
    Extension {
        extension_id: String,
        menu_item_id: String,
        kind: ExtensionItemKind,
        was_checked: bool,
    },
    InspectElement { x: i32, y: i32 },
    ShowSettings,
}

impl MenuCommand {
    /// Commands that act on the originating surface and must not run once
    /// it has been destroyed
    pub fn targets_surface(&self) -> bool {
        matches!(
            self,
            Self::ReplaceMisspelling { .. }
                | Self::OpenLink { .. }
                | Self::Edit(_)
                | Self::Navigate(_)
                | Self::Extension { .. }
                | Self::InspectElement { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Normal,
    Checkbox,
    Radio,
    Submenu,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuItem {
    /// Assigned during assembly, depth first
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<EditRole>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub checked: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub submenu: Vec<MenuEntry>,
    #[serde(skip)]
    pub command: Option<MenuCommand>,
}

impl MenuItem {
    pub fn action(label: impl Into<String>, command: MenuCommand) -> Self {
        let role = match &command {
            MenuCommand::Edit(role) => Some(*role),
            _ => None,
        };
        Self {
            id: String::new(),
            label: label.into(),
            kind: ItemKind::Normal,
            role,
            enabled: true,
            checked: false,
            submenu: Vec::new(),
            command: Some(command),
        }
    }

    /// Greyed-out informational item
    pub fn note(label: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            label: label.into(),
            kind: ItemKind::Normal,
            role: None,
            enabled: false,
            checked: false,
            submenu: Vec::new(),
            command: None,
        }
    }

    pub fn submenu(label: impl Into<String>, entries: Vec<MenuEntry>) -> Self {
        Self {
            id: String::new(),
            label: label.into(),
            kind: ItemKind::Submenu,
            role: None,
            enabled: true,
            checked: false,
            submenu: entries,
            command: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn checkable(mut self, kind: ItemKind, checked: bool) -> Self {
        self.kind = kind;
        self.checked = checked;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum MenuEntry {
    Item(MenuItem),
    Separator,
}

impl From<MenuItem> for MenuEntry {
    fn from(item: MenuItem) -> Self {
        Self::Item(item)
    }
}

/// Join non-empty sections with exactly one separator between neighbours.
/// Empty sections leave no trace; there is never a leading, trailing or
/// doubled separator. Item ids are assigned here.
pub fn assemble(sections: Vec<Vec<MenuEntry>>) -> Vec<MenuEntry> {
    let mut template = Vec::new();
    for section in sections {
        let section = tidy_separators(section);
        if section.is_empty() {
            continue;
        }
        if !template.is_empty() {
            template.push(MenuEntry::Separator);
        }
        template.extend(section);
    }
    let mut next_id = 0;
    number_items(&mut template, &mut next_id);
    template
}

/// Drop leading, trailing and repeated separators inside one entry list
pub(crate) fn tidy_separators(entries: Vec<MenuEntry>) -> Vec<MenuEntry> {
    let mut tidy: Vec<MenuEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            MenuEntry::Separator => {
                if matches!(tidy.last(), Some(MenuEntry::Item(_))) {
                    tidy.push(MenuEntry::Separator);
                }
            }
            item => tidy.push(item),
        }
    }
    if matches!(tidy.last(), Some(MenuEntry::Separator)) {
        tidy.pop();
    }
    tidy
}

fn number_items(entries: &mut [MenuEntry], next_id: &mut usize) {
    for entry in entries {
        if let MenuEntry::Item(item) = entry {
            *next_id += 1;
            item.id = format!("item-{next_id}");
            number_items(&mut item.submenu, next_id);
        }
    }
}

/// Depth-first lookup of an item by id
pub fn find_item<'a>(entries: &'a [MenuEntry], id: &str) -> Option<&'a MenuItem> {
    entries.iter().find_map(|entry| match entry {
        MenuEntry::Item(item) if item.id == id => Some(item),
        MenuEntry::Item(item) => find_item(&item.submenu, id),
        MenuEntry::Separator => None,
    })
}

/// Labels of top-level entries with separators as `"-"`; handy for logs
pub fn outline(entries: &[MenuEntry]) -> Vec<&str> {
    entries
        .iter()
        .map(|entry| match entry {
            MenuEntry::Item(item) => item.label.as_str(),
            MenuEntry::Separator => "-",
        })
        .collect()
}
