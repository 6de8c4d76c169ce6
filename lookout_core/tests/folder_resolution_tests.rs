// Every folder-taking operation must resolve folder arguments the same way:
// the literal "Inbox" means the built-in inbox, slash paths nest leaf-first.

use lookout_core::connectors::outlook_mail::script::{
    script_count_emails, script_delete_folder, script_move_email, script_read_emails,
    script_rename_folder, script_search_emails, DateRange,
};

const NESTED: &str = r#"mail folder "Q3" of mail folder "Reports" of mail folder "Work""#;

#[test]
fn test_every_operation_resolves_nested_paths_identically() {
    let path = "Work/Reports/Q3";
    let range = DateRange::default();

    assert!(script_read_emails(path, 10, &range).contains(NESTED));
    assert!(script_search_emails(path, "x", 10, &range).contains(NESTED));
    assert!(script_count_emails(path, false).contains(NESTED));
    assert!(script_move_email(1, path).contains(NESTED));
    assert!(script_rename_folder(path, "Q4").contains(NESTED));
    assert!(script_delete_folder(path).contains(NESTED));
}

#[test]
fn test_every_operation_resolves_inbox_to_builtin() {
    let range = DateRange::default();

    for script in [
        script_read_emails("Inbox", 10, &range),
        script_search_emails("Inbox", "x", 10, &range),
        script_count_emails("Inbox", true),
    ] {
        assert!(script.contains("set theFolder to inbox"), "{}", script);
        assert!(!script.contains(r#"mail folder "Inbox""#));
    }
    assert!(script_move_email(1, "Inbox").contains("to inbox"));
}

#[test]
fn test_quotes_in_folder_names_escaped_everywhere() {
    let tricky = r#"He said "go""#;
    let escaped = r#"mail folder "He said \"go\"""#;

    assert!(script_count_emails(tricky, false).contains(escaped));
    assert!(script_move_email(1, tricky).contains(escaped));
    assert!(script_delete_folder(tricky).contains(escaped));
}
