use super::{exit_codes, mutation_code, Session};
use crate::cli::args::{DatasetArgs, DatasetSub};
use promptfactory_core::config::FactoryConfig;
use promptfactory_core::Workspace;

fn resolve_dataset(ws: &Workspace, reference: &str) -> Option<String> {
    let found = ws
        .datasets()
        .iter()
        .find(|d| d.id == reference || d.name == reference)
        .map(|d| d.id.clone());
    if found.is_none() {
        eprintln!("dataset not found: {}", reference);
    }
    found
}

pub fn run(args: DatasetArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;
    let ws = &mut session.ws;

    let code = match args.cmd {
        DatasetSub::Add { name, messages } => {
            let dataset = ws.add_dataset(&name, messages);
            println!("{}  {}", dataset.id, dataset.name);
            exit_codes::OK
        }
        DatasetSub::Remove { dataset } => match resolve_dataset(ws, &dataset) {
            Some(id) => mutation_code(ws.remove_dataset(&id), &dataset),
            None => exit_codes::REFUSED,
        },
        DatasetSub::Hide { dataset } => match resolve_dataset(ws, &dataset) {
            Some(id) => mutation_code(
                ws.set_dataset_visible(&id, false),
                &format!("{} is already hidden", dataset),
            ),
            None => exit_codes::REFUSED,
        },
        DatasetSub::Unhide { dataset } => match resolve_dataset(ws, &dataset) {
            Some(id) => mutation_code(
                ws.set_dataset_visible(&id, true),
                &format!("{} is already visible", dataset),
            ),
            None => exit_codes::REFUSED,
        },
        DatasetSub::List => {
            let visible: Vec<&str> = ws.visible_datasets().into_iter().map(|d| d.id.as_str()).collect();
            for d in ws.datasets() {
                let mark = if visible.contains(&d.id.as_str()) { " " } else { "h" };
                println!("{} {}  {} ({} messages)", mark, d.id, d.name, d.messages.len());
            }
            return Ok(exit_codes::OK);
        }
    };

    session.save()?;
    Ok(code)
}
