mod common;

use bindrepo_core::{FindQuery, RepoError, Repository, SqlRepository};
use common::{task_app, Task};

fn not_found(result: Result<impl Sized, RepoError>) -> bool {
    matches!(result, Err(RepoError::NotFound { .. }))
}

#[test]
fn soft_deleted_rows_are_hidden_unless_included() {
    let (_app, repo) = task_app();
    repo.insert_many(vec![Task::new("keep"), Task::new("drop")], None)
        .unwrap();

    repo.delete_one(2, true, None).unwrap();

    assert!(not_found(repo.find_one(2, false, None)));
    let deleted = repo.find_one(2, true, None).unwrap();
    assert!(deleted.timestamps.is_deleted());

    let visible = repo.find_many(&FindQuery::new(), None).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "keep");
    let all = repo
        .find_many(&FindQuery::new().include_soft_deleted(true), None)
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn soft_delete_of_missing_or_deleted_row_is_not_found() {
    let (_app, repo) = task_app();
    repo.insert_one(Task::new("once"), None).unwrap();

    repo.delete_one(1, true, None).unwrap();
    assert!(not_found(repo.delete_one(1, true, None)));
    assert!(not_found(repo.delete_one(7, true, None)));
}

#[test]
fn hard_delete_removes_live_and_soft_deleted_rows() {
    let (_app, repo) = task_app();
    repo.insert_many(vec![Task::new("live"), Task::new("soft")], None)
        .unwrap();
    repo.delete_one(2, true, None).unwrap();

    repo.delete_one(1, false, None).unwrap();
    repo.delete_one(2, false, None).unwrap();

    assert!(not_found(repo.find_one(1, true, None)));
    assert!(not_found(repo.find_one(2, true, None)));
    assert!(not_found(repo.delete_one(1, false, None)));
}

#[test]
fn restore_clears_deleted_marker() {
    let (_app, repo) = task_app();
    repo.insert_one(Task::new("back"), None).unwrap();
    repo.delete_one(1, true, None).unwrap();

    let restored = repo.restore_one(1, None).unwrap();
    assert!(!restored.timestamps.is_deleted());
    assert_eq!(repo.find_one(1, false, None).unwrap().title, "back");

    let again = repo.restore_one(1, None).unwrap();
    assert_eq!(again.timestamps.deleted_at, None);
    assert!(not_found(repo.restore_one(9, None)));
}

#[test]
fn restore_many_is_all_or_nothing() {
    let (_app, repo) = task_app();
    repo.insert_many(vec![Task::new("a"), Task::new("b")], None)
        .unwrap();
    repo.delete_many(&[1, 2], true, None).unwrap();

    assert!(not_found(repo.restore_many(&[1, 5], None)));
    assert!(repo.find_many(&FindQuery::new(), None).unwrap().is_empty());

    let restored = repo.restore_many(&[1, 2], None).unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(repo.find_many(&FindQuery::new(), None).unwrap().len(), 2);
}

#[test]
fn delete_many_rolls_back_on_missing_key() {
    let (_app, repo) = task_app();
    repo.insert_many(vec![Task::new("a"), Task::new("b")], None)
        .unwrap();

    assert!(not_found(repo.delete_many(&[1, 99, 2], true, None)));
    assert_eq!(repo.find_many(&FindQuery::new(), None).unwrap().len(), 2);

    assert_eq!(repo.delete_many(&[1, 2], false, None).unwrap(), 2);
    assert!(repo
        .find_many(&FindQuery::new().include_soft_deleted(true), None)
        .unwrap()
        .is_empty());
}

#[test]
fn update_changes_live_row_and_refreshes_updated_at() {
    let (_app, repo) = task_app();
    let mut task = repo.insert_one(Task::new("draft"), None).unwrap();
    task.timestamps.updated_at = Some(0);
    task.title = "final".to_string();
    task.done = true;

    let updated = repo.update_one(task.clone(), false, None).unwrap();

    assert_eq!(updated.title, "final");
    assert!(updated.done);
    assert!(updated.timestamps.updated_at > Some(0));
    assert_eq!(updated.timestamps.created_at, task.timestamps.created_at);
    assert_eq!(repo.find_one(1, false, None).unwrap(), updated);
}

#[test]
fn update_without_upsert_requires_existing_live_row() {
    let (_app, repo) = task_app();

    assert!(not_found(repo.update_one(Task::with_id(3, "ghost"), false, None)));
    assert!(matches!(
        repo.update_one(Task::new("keyless"), false, None),
        Err(RepoError::MissingPrimaryKey("tasks"))
    ));

    repo.insert_one(Task::new("gone"), None).unwrap();
    repo.delete_one(1, true, None).unwrap();
    assert!(not_found(repo.update_one(Task::with_id(1, "revived"), false, None)));
    assert!(not_found(repo.update_one(Task::with_id(1, "revived"), true, None)));
    assert_eq!(repo.find_one(1, true, None).unwrap().title, "gone");
}

#[test]
fn upsert_inserts_missing_rows() {
    let (_app, repo) = task_app();

    let keyed = repo.update_one(Task::with_id(5, "keyed"), true, None).unwrap();
    assert_eq!(keyed.id, Some(5));
    let keyless = repo.update_one(Task::new("keyless"), true, None).unwrap();
    assert_eq!(keyless.id, Some(6));

    let stored = repo.find_many(&FindQuery::new(), None).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored[0].timestamps.created_at.is_some());
}

#[test]
fn update_many_rolls_back_whole_batch() {
    let (_app, repo) = task_app();
    let inserted = repo
        .insert_many(vec![Task::new("a"), Task::new("b")], None)
        .unwrap();
    let renamed = inserted
        .into_iter()
        .map(|mut task| {
            task.title.push_str("-renamed");
            task
        })
        .chain([Task::with_id(40, "missing")])
        .collect::<Vec<_>>();

    assert!(not_found(repo.update_many(renamed, false, None)));

    let stored = repo.find_many(&FindQuery::new(), None).unwrap();
    assert_eq!(stored[0].title, "a");
    assert_eq!(stored[1].title, "b");
}

#[test]
fn delete_many_counts_repeated_keys_once() {
    let (_app, repo) = task_app();
    repo.insert_many(vec![Task::new("a"), Task::new("b")], None)
        .unwrap();

    assert_eq!(repo.delete_many(&[1, 1], true, None).unwrap(), 1);
    assert!(repo.find_one(1, true, None).unwrap().timestamps.is_deleted());
    assert_eq!(titles_left(&repo), vec!["b"]);
}

fn titles_left(repo: &SqlRepository<Task>) -> Vec<String> {
    repo.find_many(&FindQuery::new(), None)
        .unwrap()
        .into_iter()
        .map(|task| task.title)
        .collect()
}
