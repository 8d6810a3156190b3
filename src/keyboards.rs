//! Message texts and inline keyboards shown by the bot.
use crate::callback::{CallbackAction, ADD, MENU, SEE_ALL};
use crate::model::WatchEntry;
use crate::transport::{Button, Keyboard};

pub const START_TEXT: &str = "Pick one of the options below";
pub const ABOUT_TEXT: &str = "I watch GitHub repositories and message you when they publish a new release.\n\
Add a repo with \"Add a repo\", then manage it from \"See all repos\".";
pub const UNKNOWN_COMMAND_TEXT: &str =
    "Sorry, I don't understand. Please pick one of the valid options.";
pub const ADD_PROMPT_TEXT: &str = "Send a message containing your repo in one of the following formats: owner/repo, https://github.com/owner/repo";
pub const INVALID_REPO_TEXT: &str = "Error: Invalid repo. Send a message containing your repo in one of the following formats: owner/repo, https://github.com/owner/repo";
pub const LIST_TEXT: &str = "Here are your watched repos with their latest releases. An active third button means you will also be notified of prereleases.";
pub const EMPTY_LIST_TEXT: &str = "There are no watched repos. Add one?";
pub const ADDED_TEXT: &str = "Repo added successfully. Add another?";
pub const ADDED_NO_RELEASES_TEXT: &str = "Repo added successfully but it has no releases yet. I will ping you when there is one. Add another?";
pub const ALREADY_WATCHING_TEXT: &str = "Repo already exists in your watched list. Try another?";
pub const NOT_FOUND_TEXT: &str = "I could not find the repo. Try again?";

const SEE_ALL_LABEL: &str = "See all repos";
const ADD_LABEL: &str = "Add a repo";
const CANCEL_LABEL: &str = "Cancel";
const YES_LABEL: &str = "Yes";
const NO_LABEL: &str = "No";
const PREVIOUS_LABEL: &str = "Previous";
const NEXT_LABEL: &str = "Next";
const BACK_LABEL: &str = "Back to Menu";
const DELETE_LABEL: &str = "🗑️";
const PRE_ON_LABEL: &str = "Pre: ✔️";
const PRE_OFF_LABEL: &str = "Pre: ❌";
const NO_RELEASE_LABEL: &str = "N/A";
const CHECK_RELEASE_LABEL: &str = "Check it out";

pub fn start_keyboard() -> Keyboard {
    vec![
        vec![Button::callback(SEE_ALL_LABEL, SEE_ALL)],
        vec![Button::callback(ADD_LABEL, ADD)],
    ]
}

pub fn cancel_add_keyboard() -> Keyboard {
    vec![vec![Button::callback(CANCEL_LABEL, MENU)]]
}

/// "Add another?" Yes/No.
pub fn add_another_keyboard() -> Keyboard {
    vec![vec![
        Button::callback(YES_LABEL, ADD),
        Button::callback(NO_LABEL, MENU),
    ]]
}

/// Text and button for a release notification.
pub fn release_notification(entry: &WatchEntry, tag: &str, prerelease: bool) -> (String, Keyboard) {
    let kind = if prerelease { "prerelease" } else { "release" };
    let text = format!("New {}: {} : {}", kind, entry.name, tag);
    let keyboard = vec![vec![Button::url(CHECK_RELEASE_LABEL, entry.release_url(tag))]];
    (text, keyboard)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub text: &'static str,
    pub keyboard: Keyboard,
    /// Page actually rendered after clamping.
    pub page: usize,
}

/// Render one page of a chat's watch-list.
///
/// A page past the end is clamped to the last page. The pagination row is
/// only present when at least one direction is available.
pub fn render_watch_page(entries: &[WatchEntry], page: usize, page_size: usize) -> PageView {
    if entries.is_empty() {
        return PageView {
            text: EMPTY_LIST_TEXT,
            keyboard: add_another_keyboard(),
            page: 0,
        };
    }

    let page_size = page_size.max(1);
    let last_page = (entries.len() - 1) / page_size;
    let page = page.min(last_page);
    let start = page * page_size;
    let end = (start + page_size).min(entries.len());

    let mut rows: Keyboard = entries[start..end].iter().map(entry_row).collect();

    let mut pagination = Vec::new();
    if page > 0 {
        pagination.push(Button::callback(
            PREVIOUS_LABEL,
            CallbackAction::PreviousPage(page - 1).to_string(),
        ));
    }
    if end < entries.len() {
        pagination.push(Button::callback(
            NEXT_LABEL,
            CallbackAction::NextPage(page + 1).to_string(),
        ));
    }
    if !pagination.is_empty() {
        rows.push(pagination);
    }
    rows.push(vec![Button::callback(BACK_LABEL, MENU)]);

    PageView {
        text: LIST_TEXT,
        keyboard: rows,
        page,
    }
}

fn entry_row(entry: &WatchEntry) -> Vec<Button> {
    let release = match entry.current_release_tag() {
        Some(tag) => Button::url(tag, entry.release_url(tag)),
        None => Button::url(NO_RELEASE_LABEL, entry.releases_url()),
    };
    let (label, next_value) = if entry.notify_prerelease {
        (PRE_ON_LABEL, false)
    } else {
        (PRE_OFF_LABEL, true)
    };
    let toggle = CallbackAction::TogglePrerelease {
        repo_id: entry.repo_id.clone(),
        notify: next_value,
    };
    let delete = CallbackAction::Delete {
        repo_id: entry.repo_id.clone(),
    };
    vec![
        Button::url(entry.name.clone(), entry.link.clone()),
        release,
        Button::callback(label, toggle.to_string()),
        Button::callback(DELETE_LABEL, delete.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Release;
    use crate::transport::ButtonAction;

    fn entries(n: usize) -> Vec<WatchEntry> {
        (1..=n)
            .map(|i| WatchEntry {
                chat_id: "42".into(),
                repo_id: format!("R_{}", i),
                owner: "o".into(),
                name: format!("repo{}", i),
                link: format!("https://github.com/o/repo{}", i),
                current: None,
                notify_prerelease: false,
            })
            .collect()
    }

    fn labels(row: &[Button]) -> Vec<&str> {
        row.iter().map(|b| b.text.as_str()).collect()
    }

    #[test]
    fn first_page_has_only_next() {
        let view = render_watch_page(&entries(5), 0, 2);
        assert_eq!(view.text, LIST_TEXT);
        // two entries + pagination + back
        assert_eq!(view.keyboard.len(), 4);
        assert_eq!(view.keyboard[0][0].text, "repo1");
        assert_eq!(view.keyboard[1][0].text, "repo2");
        assert_eq!(labels(&view.keyboard[2]), vec![NEXT_LABEL]);
        assert_eq!(
            view.keyboard[2][0].action,
            ButtonAction::Callback("OP_NEXT_1".into())
        );
        assert_eq!(labels(&view.keyboard[3]), vec![BACK_LABEL]);
    }

    #[test]
    fn middle_page_has_both_directions() {
        let view = render_watch_page(&entries(5), 1, 2);
        assert_eq!(view.keyboard[0][0].text, "repo3");
        assert_eq!(labels(&view.keyboard[2]), vec![PREVIOUS_LABEL, NEXT_LABEL]);
    }

    #[test]
    fn last_page_has_only_previous() {
        let view = render_watch_page(&entries(5), 2, 2);
        assert_eq!(view.keyboard.len(), 3);
        assert_eq!(view.keyboard[0][0].text, "repo5");
        assert_eq!(labels(&view.keyboard[1]), vec![PREVIOUS_LABEL]);
        assert_eq!(
            view.keyboard[1][0].action,
            ButtonAction::Callback("OP_PREV_1".into())
        );
    }

    #[test]
    fn single_page_has_no_pagination_row() {
        let view = render_watch_page(&entries(2), 0, 2);
        assert_eq!(view.keyboard.len(), 3);
        assert_eq!(labels(&view.keyboard[2]), vec![BACK_LABEL]);
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let view = render_watch_page(&entries(3), 9, 2);
        assert_eq!(view.page, 1);
        assert_eq!(view.keyboard[0][0].text, "repo3");
    }

    #[test]
    fn empty_list_offers_to_add() {
        let view = render_watch_page(&[], 0, 2);
        assert_eq!(view.text, EMPTY_LIST_TEXT);
        assert_eq!(view.keyboard, add_another_keyboard());
    }

    #[test]
    fn entry_row_buttons() {
        let mut list = entries(1);
        list[0].current = Some(Release {
            tag: "v1.2.0".into(),
            id: "RE_1".into(),
            is_prerelease: false,
        });
        list[0].notify_prerelease = true;
        let view = render_watch_page(&list, 0, 5);
        let row = &view.keyboard[0];
        assert_eq!(
            row[1].action,
            ButtonAction::Url("https://github.com/o/repo1/releases/tag/v1.2.0".into())
        );
        assert_eq!(row[2].text, PRE_ON_LABEL);
        assert_eq!(row[2].action, ButtonAction::Callback("OP_FLIP_F_R_1".into()));
        assert_eq!(row[3].action, ButtonAction::Callback("R_1".into()));
    }

    #[test]
    fn entry_without_release_links_to_releases_page() {
        let view = render_watch_page(&entries(1), 0, 5);
        let row = &view.keyboard[0];
        assert_eq!(row[1].text, NO_RELEASE_LABEL);
        assert_eq!(
            row[1].action,
            ButtonAction::Url("https://github.com/o/repo1/releases".into())
        );
        assert_eq!(row[2].action, ButtonAction::Callback("OP_FLIP_T_R_1".into()));
    }

    #[test]
    fn notification_text_marks_prereleases() {
        let list = entries(1);
        let e = &list[0];
        let (text, kb) = release_notification(e, "v2.0.0-rc.1", true);
        assert_eq!(text, "New prerelease: repo1 : v2.0.0-rc.1");
        assert_eq!(
            kb[0][0].action,
            ButtonAction::Url("https://github.com/o/repo1/releases/tag/v2.0.0-rc.1".into())
        );
        let (text, _) = release_notification(e, "v2.0.0", false);
        assert_eq!(text, "New release: repo1 : v2.0.0");
    }
}
