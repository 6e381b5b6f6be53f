//! Built-in menu sections
//!
//! Each builder looks only at the click context and its collaborators and
//! returns zero or more entries. None of them sees another section's output.

use super::collaborators::{ClickParams, EditRole, Navigation, Spellchecker, SurfaceId, WindowManager};
use super::template::{MenuCommand, MenuEntry, MenuItem};
use crate::config::MenuConfig;

/// Most suggestions shown per dictionary
const MAX_SUGGESTIONS: usize = 5;
/// Selection text longer than this is cut with an ellipsis in labels
const LABEL_SELECTION_CHARS: usize = 20;

/// Everything a section builder may read
pub(crate) struct SectionInput<'a> {
    pub surface: SurfaceId,
    pub params: &'a ClickParams,
    pub config: &'a MenuConfig,
    pub spellchecker: &'a dyn Spellchecker,
    pub windows: &'a dyn WindowManager,
}

pub(crate) fn spelling(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let params = input.params;
    let Some(word) = params
        .misspelled_word
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
    else {
        return Vec::new();
    };
    if !params.is_editable
        || input.spellchecker.primary_language().is_none()
        || input.spellchecker.installed_dictionaries().is_empty()
    {
        return Vec::new();
    }
    let Some(found) = input.spellchecker.spell_suggestions(word) else {
        return Vec::new();
    };

    let mut entries: Vec<MenuEntry> = found
        .primary
        .suggestions
        .iter()
        .take(MAX_SUGGESTIONS)
        .map(|s| replace_item(s))
        .collect();
    if entries.is_empty() {
        entries.push(MenuItem::note("No Spelling Suggestions").into());
    }

    if let Some(secondary) = found.secondary.filter(|s| !s.suggestions.is_empty()) {
        entries.push(MenuEntry::Separator);
        let language = input
            .spellchecker
            .humanized_language_name(&secondary.language);
        entries.push(MenuItem::note(language).into());
        entries.extend(
            secondary
                .suggestions
                .iter()
                .take(MAX_SUGGESTIONS)
                .map(|s| replace_item(s)),
        );
    }

    entries.push(MenuEntry::Separator);
    entries.push(
        MenuItem::action(
            "Add to Dictionary",
            MenuCommand::AddToDictionary {
                word: word.to_owned(),
            },
        )
        .into(),
    );
    entries
}

fn replace_item(suggestion: &str) -> MenuEntry {
    MenuItem::action(
        suggestion,
        MenuCommand::ReplaceMisspelling {
            word: suggestion.to_owned(),
        },
    )
    .into()
}

pub(crate) fn url(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let params = input.params;
    let mut entries = Vec::new();

    if let Some(link) = params.link() {
        if let Some(address) = link.strip_prefix("mailto:") {
            entries.push(copy_item("Copy Email Address", address));
        } else {
            entries.push(
                MenuItem::action(
                    "Open Link",
                    MenuCommand::OpenLink {
                        url: link.to_owned(),
                    },
                )
                .into(),
            );
            entries.push(open_external_item("Open Link in Browser", link));
            entries.push(copy_item("Copy Link Address", link));
        }
        if let Some(text) = params
            .link_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            entries.push(copy_item("Copy Link Text", text));
        }
    }

    let media = params.media_type.label().zip(
        params
            .src_url
            .as_deref()
            .filter(|src| !src.trim().is_empty()),
    );
    if let Some((kind, src)) = media {
        // Inline data has nowhere to open
        if !src.starts_with("data:") {
            entries.push(open_external_item(&format!("Open {kind} in Browser"), src));
        }
        entries.push(copy_item(&format!("Copy {kind} Address"), src));
    }
    entries
}

pub(crate) fn lookup(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let Some(selection) = input.params.selection() else {
        return Vec::new();
    };
    let short = shorten(selection);
    let mut entries = Vec::new();
    if input.config.lookup_enabled {
        entries.push(
            MenuItem::action(
                format!("Look Up \u{201c}{short}\u{201d}"),
                MenuCommand::Edit(EditRole::LookUp),
            )
            .into(),
        );
    }
    entries.push(
        MenuItem::action(
            format!(
                "Search {} for \u{201c}{short}\u{201d}",
                input.config.search_provider
            ),
            MenuCommand::OpenExternal {
                url: format!(
                    "{}{}",
                    input.config.search_url,
                    urlencoding::encode(selection)
                ),
            },
        )
        .into(),
    );
    entries
}

pub(crate) fn history(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let params = input.params;
    if !params.is_editable {
        return Vec::new();
    }
    vec![
        edit_item("Undo", EditRole::Undo, params.edit_flags.can_undo),
        edit_item("Redo", EditRole::Redo, params.edit_flags.can_redo),
    ]
}

pub(crate) fn editing(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let params = input.params;
    let flags = params.edit_flags;
    if params.is_editable {
        return vec![
            edit_item("Cut", EditRole::Cut, flags.can_cut),
            edit_item("Copy", EditRole::Copy, flags.can_copy),
            edit_item("Paste", EditRole::Paste, flags.can_paste),
            edit_item(
                "Paste and Match Style",
                EditRole::PasteAndMatchStyle,
                flags.can_paste,
            ),
            edit_item("Select All", EditRole::SelectAll, flags.can_select_all),
        ];
    }
    if params.selection().is_some() {
        return vec![edit_item("Copy", EditRole::Copy, true)];
    }
    Vec::new()
}

pub(crate) fn navigation(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let params = input.params;
    if params.link().is_some() || params.selection().is_some() || params.is_editable {
        return Vec::new();
    }
    vec![
        MenuItem::action("Back", MenuCommand::Navigate(Navigation::Back))
            .enabled(input.windows.can_go_back(input.surface))
            .into(),
        MenuItem::action("Forward", MenuCommand::Navigate(Navigation::Forward))
            .enabled(input.windows.can_go_forward(input.surface))
            .into(),
        MenuItem::action("Reload", MenuCommand::Navigate(Navigation::Reload)).into(),
    ]
}

pub(crate) fn external(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let Some(page) = input.params.page() else {
        return Vec::new();
    };
    let mut entries = vec![copy_item("Copy Current Page URL", page)];
    if page.starts_with("http://") || page.starts_with("https://") {
        entries.push(open_external_item("Open Page in Browser", page));
    }
    entries
}

pub(crate) fn app_settings(input: &SectionInput<'_>) -> Vec<MenuEntry> {
    let mut entries = Vec::new();
    if input.config.devtools_enabled {
        entries.push(
            MenuItem::action(
                "Inspect Element",
                MenuCommand::InspectElement {
                    x: input.params.x,
                    y: input.params.y,
                },
            )
            .into(),
        );
    }
    entries.push(MenuItem::action("Settings", MenuCommand::ShowSettings).into());
    entries
}

fn edit_item(label: &str, role: EditRole, enabled: bool) -> MenuEntry {
    MenuItem::action(label, MenuCommand::Edit(role))
        .enabled(enabled)
        .into()
}

fn copy_item(label: &str, text: &str) -> MenuEntry {
    MenuItem::action(
        label,
        MenuCommand::CopyText {
            text: text.to_owned(),
        },
    )
    .into()
}

fn open_external_item(label: &str, url: &str) -> MenuEntry {
    MenuItem::action(
        label,
        MenuCommand::OpenExternal {
            url: url.to_owned(),
        },
    )
    .into()
}

/// Truncate on a char boundary for use inside a label
pub(crate) fn shorten(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= LABEL_SELECTION_CHARS {
        return flat;
    }
    let mut out: String = flat.chars().take(LABEL_SELECTION_CHARS).collect();
    out.push('\u{2026}');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{
        SectionInput, app_settings, editing, external, history, lookup, navigation, shorten,
        spelling, url,
    };
    use crate::config::MenuConfig;
    use crate::context_menu::collaborators::{ClickParams, EditFlags, MediaType, SurfaceOwner};
    use crate::context_menu::template::{MenuCommand, MenuEntry, outline};
    use crate::headless::{DictionarySpellchecker, EffectLog, HeadlessWindows};

    struct Fixture {
        config: MenuConfig,
        spellchecker: DictionarySpellchecker,
        windows: HeadlessWindows,
    }

    impl Fixture {
        fn new() -> Self {
            let effects = EffectLog::default();
            let windows = HeadlessWindows::new(effects.clone());
            windows.attach(7, SurfaceOwner::TopLevel(1));
            Self {
                config: MenuConfig {
                    lookup_enabled: false,
                    ..MenuConfig::default()
                },
                spellchecker: DictionarySpellchecker::new(
                    vec!["en_US".to_owned(), "de_DE".to_owned()],
                    effects,
                ),
                windows,
            }
        }

        fn input<'a>(&'a self, params: &'a ClickParams) -> SectionInput<'a> {
            SectionInput {
                surface: 7,
                params,
                config: &self.config,
                spellchecker: &self.spellchecker,
                windows: &self.windows,
            }
        }
    }

    fn labels(entries: &[MenuEntry]) -> Vec<&str> {
        outline(entries)
    }

    #[test]
    fn spelling_offers_primary_then_secondary_then_dictionary() {
        let fixture = Fixture::new();
        let offered = BTreeMap::from([
            (
                "en_US".to_owned(),
                ["the", "ten", "tea", "tech", "tel", "tee"].map(str::to_owned).to_vec(),
            ),
            ("de_DE".to_owned(), vec!["geh".to_owned()]),
        ]);
        fixture.spellchecker.offer_suggestions(Some("teh"), &offered);
        let params = ClickParams {
            is_editable: true,
            misspelled_word: Some("teh".to_owned()),
            ..ClickParams::default()
        };

        let entries = spelling(&fixture.input(&params));
        assert_eq!(
            labels(&entries),
            vec![
                "the", "ten", "tea", "tech", "tel", "-", "German", "geh", "-",
                "Add to Dictionary"
            ]
        );
    }

    #[test]
    fn spelling_without_suggestions_shows_placeholder() {
        let fixture = Fixture::new();
        let params = ClickParams {
            is_editable: true,
            misspelled_word: Some("qzx".to_owned()),
            ..ClickParams::default()
        };
        let entries = spelling(&fixture.input(&params));
        assert_eq!(
            labels(&entries),
            vec!["No Spelling Suggestions", "-", "Add to Dictionary"]
        );
    }

    #[test]
    fn spelling_is_empty_for_correct_or_read_only_words() {
        let fixture = Fixture::new();
        let params = ClickParams {
            is_editable: false,
            misspelled_word: Some("qzx".to_owned()),
            ..ClickParams::default()
        };
        assert!(spelling(&fixture.input(&params)).is_empty());
        assert!(spelling(&fixture.input(&ClickParams::default())).is_empty());
    }

    #[test]
    fn link_section_lists_link_actions() {
        let fixture = Fixture::new();
        let params = ClickParams {
            link_url: Some("https://example.com/a".to_owned()),
            link_text: Some("Example".to_owned()),
            ..ClickParams::default()
        };
        assert_eq!(
            labels(&url(&fixture.input(&params))),
            vec![
                "Open Link",
                "Open Link in Browser",
                "Copy Link Address",
                "Copy Link Text"
            ]
        );
    }

    #[test]
    fn mailto_links_copy_the_address() {
        let fixture = Fixture::new();
        let params = ClickParams {
            link_url: Some("mailto:me@example.com".to_owned()),
            ..ClickParams::default()
        };
        let entries = url(&fixture.input(&params));
        let MenuEntry::Item(item) = &entries[0] else {
            panic!("expected item");
        };
        assert_eq!(item.label, "Copy Email Address");
        assert_eq!(
            item.command,
            Some(MenuCommand::CopyText {
                text: "me@example.com".to_owned()
            })
        );
    }

    #[test]
    fn media_section_uses_media_kind() {
        let fixture = Fixture::new();
        let params = ClickParams {
            src_url: Some("https://example.com/cat.png".to_owned()),
            media_type: MediaType::Image,
            ..ClickParams::default()
        };
        assert_eq!(
            labels(&url(&fixture.input(&params))),
            vec!["Open Image in Browser", "Copy Image Address"]
        );

        let inline = ClickParams {
            src_url: Some("data:image/png;base64,AAAA".to_owned()),
            media_type: MediaType::Image,
            ..ClickParams::default()
        };
        assert_eq!(labels(&url(&fixture.input(&inline))), vec!["Copy Image Address"]);
    }

    #[test]
    fn search_truncates_label_and_encodes_query() {
        let fixture = Fixture::new();
        let params = ClickParams {
            selection_text: "rust ownership and borrowing".to_owned(),
            ..ClickParams::default()
        };
        let entries = lookup(&fixture.input(&params));
        assert_eq!(entries.len(), 1);
        let MenuEntry::Item(item) = &entries[0] else {
            panic!("expected item");
        };
        assert_eq!(
            item.label,
            "Search Google for \u{201c}rust ownership and b\u{2026}\u{201d}"
        );
        assert_eq!(
            item.command,
            Some(MenuCommand::OpenExternal {
                url: "https://www.google.com/search?q=rust%20ownership%20and%20borrowing"
                    .to_owned()
            })
        );
    }

    #[test]
    fn lookup_entry_follows_config() {
        let mut fixture = Fixture::new();
        fixture.config.lookup_enabled = true;
        let params = ClickParams {
            selection_text: "word".to_owned(),
            ..ClickParams::default()
        };
        let entries = lookup(&fixture.input(&params));
        assert_eq!(labels(&entries)[0], "Look Up \u{201c}word\u{201d}");
    }

    #[test]
    fn editable_targets_get_history_and_edit_roles() {
        let fixture = Fixture::new();
        let params = ClickParams {
            is_editable: true,
            edit_flags: EditFlags {
                can_undo: true,
                can_paste: true,
                ..EditFlags::default()
            },
            ..ClickParams::default()
        };
        let history = history(&fixture.input(&params));
        let enabled: Vec<bool> = history
            .iter()
            .map(|e| matches!(e, MenuEntry::Item(i) if i.enabled))
            .collect();
        assert_eq!(enabled, vec![true, false]);

        assert_eq!(
            labels(&editing(&fixture.input(&params))),
            vec!["Cut", "Copy", "Paste", "Paste and Match Style", "Select All"]
        );
    }

    #[test]
    fn read_only_selection_only_offers_copy() {
        let fixture = Fixture::new();
        let params = ClickParams {
            selection_text: "hello".to_owned(),
            ..ClickParams::default()
        };
        assert_eq!(labels(&editing(&fixture.input(&params))), vec!["Copy"]);
        assert!(history(&fixture.input(&params)).is_empty());
        assert!(navigation(&fixture.input(&params)).is_empty());
    }

    #[test]
    fn plain_page_click_offers_navigation_per_history() {
        let fixture = Fixture::new();
        fixture.windows.set_history(7, true, false);
        let entries = navigation(&fixture.input(&ClickParams::default()));
        let states: Vec<(&str, bool)> = entries
            .iter()
            .filter_map(|e| match e {
                MenuEntry::Item(i) => Some((i.label.as_str(), i.enabled)),
                MenuEntry::Separator => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![("Back", true), ("Forward", false), ("Reload", true)]
        );
    }

    #[test]
    fn page_external_needs_a_page_url() {
        let fixture = Fixture::new();
        assert!(external(&fixture.input(&ClickParams::default())).is_empty());
        let params = ClickParams {
            page_url: Some("https://mail.google.com/".to_owned()),
            ..ClickParams::default()
        };
        assert_eq!(
            labels(&external(&fixture.input(&params))),
            vec!["Copy Current Page URL", "Open Page in Browser"]
        );
    }

    #[test]
    fn inspect_element_only_with_devtools() {
        let mut fixture = Fixture::new();
        let params = ClickParams::default();
        assert_eq!(labels(&app_settings(&fixture.input(&params))), vec!["Settings"]);
        fixture.config.devtools_enabled = true;
        assert_eq!(
            labels(&app_settings(&fixture.input(&params))),
            vec!["Inspect Element", "Settings"]
        );
    }

    #[test]
    fn shorten_counts_chars_not_bytes() {
        assert_eq!(shorten("short"), "short");
        assert_eq!(shorten("äöüäöüäöüäöüäöüäöüäöüäöü").chars().count(), 21);
        assert_eq!(shorten("  spaced\n\tout  "), "spaced out");
    }
}
