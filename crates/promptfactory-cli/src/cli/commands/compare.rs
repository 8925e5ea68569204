use super::{exit_codes, mutation_code, resolve_version, Session};
use crate::cli::args::{CompareArgs, CompareSub};
use promptfactory_core::compare::ComparePhase;
use promptfactory_core::config::FactoryConfig;

pub fn run(args: CompareArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;
    let ws = &mut session.ws;

    let code = match args.cmd {
        CompareSub::Start => mutation_code(ws.start_compare(), "compare already started"),
        CompareSub::Toggle { version } => match resolve_version(ws, &version) {
            Some(v) => {
                let code = mutation_code(
                    ws.toggle_compare_selection(&v.id),
                    "no selection in progress (run `compare start`)",
                );
                if code == exit_codes::OK {
                    let picked = ws.compare().selected().contains(&v.id);
                    println!("{} {}", if picked { "selected" } else { "unselected" }, v.name);
                }
                code
            }
            None => exit_codes::REFUSED,
        },
        CompareSub::Confirm => match ws.confirm_compare() {
            Some(0) => {
                eprintln!("note: nothing selected, comparing zero versions");
                exit_codes::OK
            }
            Some(n) => {
                println!("comparing {} versions", n);
                exit_codes::OK
            }
            None => {
                eprintln!("ignored: no selection in progress");
                exit_codes::REFUSED
            }
        },
        CompareSub::Cancel => mutation_code(ws.cancel_compare(), "no selection in progress"),
        CompareSub::Reorder { from, to } => {
            mutation_code(ws.reorder_compare(from, to), "reorder out of range")
        }
        CompareSub::Exit => mutation_code(ws.exit_compare(), "not comparing"),
        CompareSub::Show => {
            let compare = ws.compare();
            let phase = match compare.phase() {
                ComparePhase::Idle => "idle",
                ComparePhase::Selecting => "selecting",
                ComparePhase::Comparing => "comparing",
            };
            println!("phase: {}", phase);
            match compare.phase() {
                ComparePhase::Selecting => {
                    for id in compare.selected() {
                        let name = ws.versions().get(id).map_or("?", |v| v.name.as_str());
                        println!("  [x] {}  {}", id.get(..8).unwrap_or(id), name);
                    }
                }
                ComparePhase::Comparing => {
                    for (idx, v) in compare.ordered_versions().into_iter().enumerate() {
                        println!("  {}. {}  [{}]", idx, v.name, v.data.models.join(", "));
                    }
                }
                ComparePhase::Idle => {}
            }
            return Ok(exit_codes::OK);
        }
    };

    session.save()?;
    Ok(code)
}
