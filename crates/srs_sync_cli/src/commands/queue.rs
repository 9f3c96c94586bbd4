use srs_sync::{SyncEngine, TaskKind};

pub(crate) async fn handle_enqueue(
    engine: &SyncEngine,
    kind: &str,
    payload: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind: TaskKind = kind.parse()?;
    // Mutations always get their own record; fetches collapse onto a pending one
    match engine.queue().assert_task_with_payload(kind, payload).await? {
        Some(id) => println!("Queued {kind} as task {id}."),
        None => println!("{kind} is already queued."),
    }
    Ok(())
}

pub(crate) async fn handle_refresh(
    engine: &SyncEngine,
    full: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let queue = engine.queue();
    let mut kinds = queue.assert_refresh_for_all_models(engine.settings()).await?;
    if full {
        for kind in [TaskKind::GetSubjects, TaskKind::GetLevelProgression] {
            if queue.assert_task(kind).await?.is_some() {
                kinds.push(kind);
            }
        }
    }

    if kinds.is_empty() {
        println!("Every refresh is already queued.");
    } else {
        let names: Vec<String> = kinds.iter().map(ToString::to_string).collect();
        println!("Queued: {}", names.join(", "));
    }
    println!("{} task(s) pending.", queue.count().await?);
    Ok(())
}
