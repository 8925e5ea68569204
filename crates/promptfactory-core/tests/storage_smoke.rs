use promptfactory_core::model::{Rating, SystemPromptSection};
use promptfactory_core::messages::BucketKey;
use promptfactory_core::storage::{SaveOutcome, Store};
use promptfactory_core::workspace::{
    Workspace, ADVANCED_DOCUMENT_KEY, BACKUP_DOCUMENT_KEY, PROMPT_DOCUMENT_KEY,
    SESSION_DOCUMENT_KEY,
};
use tempfile::tempdir;

#[test]
fn test_workspace_round_trips_through_disk() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("state").join("workspace.db");

    let (version_id, rubric_id) = {
        let store = Store::open(&db_path)?;
        store.init_schema()?;

        let mut ws = Workspace::new();
        ws.set_selected_models(vec!["gpt-4o".into(), "gemini-1.5".into()]);
        ws.set_section(SystemPromptSection::CharacterSettings, "You are terse.");
        ws.set_section_enabled(SystemPromptSection::Examples, false);
        ws.add_hint("Summarise this");
        let v = ws.save_version("");
        assert_eq!(v.name, "Untitled 1");

        let cat = ws.add_category("Accuracy");
        let rubric = ws.add_rubric(&cat.id, "Facts are right").unwrap();
        assert!(ws.set_score(&v.id, "gpt-4o", &rubric.id, 4.5).is_applied());
        ws.add_dataset("smoke", vec!["hello".into()]);

        let report = ws.persist(&store)?;
        let keys: Vec<&str> = report.written.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![PROMPT_DOCUMENT_KEY, ADVANCED_DOCUMENT_KEY]);
        assert_eq!(report.skipped().count(), 0);

        // nothing dirty, nothing written
        assert!(ws.persist(&store)?.written.is_empty());
        (v.id, rubric.id)
    };

    let store = Store::open(&db_path)?;
    store.init_schema()?;
    let mut ws = Workspace::load(&store)?;

    assert_eq!(ws.editor().selected_models.len(), 2);
    assert_eq!(ws.editor().hint_messages.len(), 1);
    assert_eq!(ws.composed_system_prompt(), "## Character\nYou are terse.");
    assert_eq!(ws.versions().len(), 1);
    assert_eq!(ws.ratings().overall_average(&version_id), Some(4.5));
    assert_eq!(
        ws.ratings().rubric_display_label(&rubric_id),
        "Facts are right"
    );
    assert_eq!(ws.datasets().len(), 1);
    assert_eq!(ws.visible_datasets().len(), 1);

    let next = ws.save_version("  ");
    assert_eq!(next.name, "Untitled 2");
    Ok(())
}

#[test]
fn test_session_is_only_written_when_enabled() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let mut ws = Workspace::new();
    ws.set_selected_models(vec!["m".into()]);
    ws.prepare_dispatch("hi");
    let report = ws.persist(&store)?;
    assert!(report.written.iter().all(|(k, _)| *k != SESSION_DOCUMENT_KEY));

    ws.set_session_persistence(true);
    let bucket = BucketKey::model("m");
    let id = ws.messages().get_messages(&bucket)[0].id.clone();
    assert!(ws.rate_message(&bucket, &id, Some(Rating::Good)).is_applied());
    let report = ws.persist(&store)?;
    assert!(report.written.iter().any(|(k, _)| *k == SESSION_DOCUMENT_KEY));

    let restored = Workspace::load(&store)?;
    let msgs = restored.messages().get_messages(&bucket);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].rating, Some(Rating::Good));
    Ok(())
}

#[test]
fn test_oversize_document_is_skipped_not_failed() -> anyhow::Result<()> {
    let store = Store::memory()?.with_quota(256);
    store.init_schema()?;

    let mut ws = Workspace::new();
    ws.set_section(SystemPromptSection::BackgroundInfo, "x".repeat(1024));
    let report = ws.persist(&store)?;

    match report.written.as_slice() {
        [(key, SaveOutcome::SkippedOverQuota { limit, .. })] => {
            assert_eq!(*key, PROMPT_DOCUMENT_KEY);
            assert_eq!(*limit, 256);
        }
        other => panic!("unexpected report {:?}", other),
    }
    assert!(store.get_document(PROMPT_DOCUMENT_KEY)?.is_none());
    Ok(())
}

#[test]
fn test_backup_restores_a_lost_prompt_document() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;

    let mut ws = Workspace::new();
    ws.enable_backup_mirror();
    ws.set_selected_models(vec!["gpt-4o".into()]);
    let v = ws.save_version("keeper");
    let report = ws.persist(&store)?;
    assert!(report.written.iter().any(|(k, _)| *k == BACKUP_DOCUMENT_KEY));

    assert!(store.delete_document(PROMPT_DOCUMENT_KEY)?);
    let restored = Workspace::load(&store)?;
    assert_eq!(restored.versions().get(&v.id).map(|v| v.name.as_str()), Some("keeper"));
    assert_eq!(restored.editor().selected_models, vec!["gpt-4o".to_string()]);
    Ok(())
}
