use super::{exit_codes, mutation_code, resolve_version, Session};
use crate::cli::args::{VersionArgs, VersionSub};
use anyhow::Context;
use promptfactory_core::config::FactoryConfig;
use promptfactory_core::model::compose_system_prompt;
use promptfactory_core::report::console;

pub fn run(args: VersionArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;
    let ws = &mut session.ws;

    let code = match args.cmd {
        VersionSub::Save { name } => {
            let v = ws.save_version(&name);
            println!("{}  {}", v.id, v.name);
            exit_codes::OK
        }
        VersionSub::List { filter } => {
            let listed: Vec<_> = ws
                .versions()
                .filtered(filter.as_deref().unwrap_or(""))
                .into_iter()
                .cloned()
                .collect();
            console::print_versions(&listed);
            return Ok(exit_codes::OK);
        }
        VersionSub::Show { version } => {
            let Some(v) = resolve_version(ws, &version) else {
                return Ok(exit_codes::REFUSED);
            };
            println!("{}", serde_json::to_string_pretty(&v)?);
            println!(
                "\n{}",
                compose_system_prompt(&v.data.system_prompt, &v.data.is_system_prompt_on)
            );
            return Ok(exit_codes::OK);
        }
        VersionSub::Rename { version, name } => match resolve_version(ws, &version) {
            Some(v) => mutation_code(ws.rename_version(&v.id, &name), &version),
            None => exit_codes::REFUSED,
        },
        VersionSub::Delete { version } => match resolve_version(ws, &version) {
            Some(v) => {
                ws.delete_version(&v.id);
                eprintln!("deleted {} ({})", v.name, v.id);
                exit_codes::OK
            }
            None => exit_codes::REFUSED,
        },
        VersionSub::Duplicate { version } => {
            match resolve_version(ws, &version).and_then(|v| ws.duplicate_version(&v.id)) {
                Some(copy) => {
                    println!("{}  {}", copy.id, copy.name);
                    exit_codes::OK
                }
                None => exit_codes::REFUSED,
            }
        }
        VersionSub::Load { version } => match resolve_version(ws, &version) {
            Some(v) => mutation_code(ws.load_version(&v.id), &version),
            None => exit_codes::REFUSED,
        },
        VersionSub::Export { version, out } => {
            let Some(v) = resolve_version(ws, &version) else {
                return Ok(exit_codes::REFUSED);
            };
            let Some(json) = ws.export_version(&v.id)? else {
                return Ok(exit_codes::REFUSED);
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("wrote file: {}", path.display());
                }
                None => println!("{}", json),
            }
            return Ok(exit_codes::OK);
        }
        VersionSub::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            match ws.import_version(&raw) {
                Ok(report) => {
                    if report.renamed {
                        eprintln!("note: name already taken, imported as '{}'", report.version.name);
                    }
                    if let Some(existing) = &report.duplicate_of {
                        eprintln!("note: same content as existing version {}", existing);
                    }
                    println!("{}  {}", report.version.id, report.version.name);
                    exit_codes::OK
                }
                Err(e) => {
                    eprintln!("import failed: {}", e);
                    return Ok(exit_codes::CONFIG_ERROR);
                }
            }
        }
    };

    session.save()?;
    Ok(code)
}
