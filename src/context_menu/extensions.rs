//! Extension-contributed context-menu items
//!
//! The runtime is queried fresh on every click. Items are filtered by their
//! declared contexts; an extension with one qualifying item gets a flat
//! top-level entry, one with several gets a submenu under its name.

use super::collaborators::{
    ClickParams, ExtensionClickPayload, ExtensionItemKind, ExtensionMenuItem, ExtensionRuntime,
    MediaType, MenuContext,
};
use super::template::{ItemKind, MenuCommand, MenuEntry, MenuItem, tidy_separators};

pub(crate) fn render_extension_section(
    runtime: &dyn ExtensionRuntime,
    params: &ClickParams,
) -> Vec<MenuEntry> {
    let mut entries = Vec::new();
    for (extension_id, menus) in runtime.context_menu_data() {
        let qualifying: Vec<&ExtensionMenuItem> = menus
            .items
            .iter()
            .filter(|item| applies(item, params))
            .collect();
        let mut rendered: Vec<MenuEntry> = qualifying
            .iter()
            .map(|item| render_item(&extension_id, item, params))
            .collect();
        rendered = tidy_separators(rendered);

        let item_count = rendered
            .iter()
            .filter(|e| matches!(e, MenuEntry::Item(_)))
            .count();
        match item_count {
            0 => {}
            1 => entries.extend(rendered),
            _ => entries.push(MenuItem::submenu(menus.name.clone(), rendered).into()),
        }
    }
    entries
}

/// Page-level (and "all") items always apply; editable-only items need an
/// editable target. Items with no declared context default to page.
fn applies(item: &ExtensionMenuItem, params: &ClickParams) -> bool {
    if item.contexts.is_empty() {
        return true;
    }
    item.contexts.iter().any(|context| match context {
        MenuContext::All | MenuContext::Page => true,
        MenuContext::Editable => params.is_editable,
    })
}

fn render_item(extension_id: &str, item: &ExtensionMenuItem, params: &ClickParams) -> MenuEntry {
    let kind = match item.kind {
        ExtensionItemKind::Separator => return MenuEntry::Separator,
        ExtensionItemKind::Normal => ItemKind::Normal,
        ExtensionItemKind::Checkbox => ItemKind::Checkbox,
        ExtensionItemKind::Radio => ItemKind::Radio,
    };
    let label = item.title.replace("%s", params.selection_text.trim());
    MenuItem::action(
        label,
        MenuCommand::Extension {
            extension_id: extension_id.to_owned(),
            menu_item_id: item.menu_id.clone(),
            kind: item.kind,
            was_checked: item.checked,
        },
    )
    .checkable(kind, item.checked)
    .enabled(item.enabled)
    .into()
}

/// Normalized payload handed back to the extension on selection
pub(crate) fn click_payload(
    menu_item_id: &str,
    kind: ExtensionItemKind,
    was_checked: bool,
    params: &ClickParams,
) -> ExtensionClickPayload {
    let (was_checked, checked) = match kind {
        ExtensionItemKind::Checkbox => (Some(was_checked), Some(!was_checked)),
        ExtensionItemKind::Radio => (Some(was_checked), Some(true)),
        ExtensionItemKind::Normal | ExtensionItemKind::Separator => (None, None),
    };
    ExtensionClickPayload {
        menu_item_id: menu_item_id.to_owned(),
        media_type: (params.media_type != MediaType::None)
            .then(|| params.media_type.as_str().to_owned()),
        link_url: params.link().map(str::to_owned),
        src_url: params.src_url.clone().filter(|s| !s.is_empty()),
        page_url: params.page().map(str::to_owned),
        frame_url: params.frame_url.clone().filter(|s| !s.is_empty()),
        selection_text: params.selection().map(str::to_owned),
        editable: params.is_editable,
        was_checked,
        checked,
    }
}
