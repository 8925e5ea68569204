use super::{exit_codes, mutation_code, Session};
use crate::cli::args::{PromptArgs, PromptSub};
use promptfactory_core::config::FactoryConfig;
use promptfactory_core::model::{section_enabled, Parameters, SystemPromptSection};

fn parse_section(raw: &str) -> Option<SystemPromptSection> {
    let section = SystemPromptSection::parse(raw);
    if section.is_none() {
        let known: Vec<&str> = SystemPromptSection::ALL.iter().map(|s| s.key()).collect();
        eprintln!("unknown section '{}' (expected one of: {})", raw, known.join(", "));
    }
    section
}

fn invalid(name: &str, e: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("invalid value for {}: {}", name, e)
}

fn apply_param(params: &mut Parameters, name: &str, value: &str) -> anyhow::Result<()> {
    match name.replace('-', "_").as_str() {
        "temperature" => params.temperature = value.parse().map_err(|e| invalid(name, e))?,
        "max_tokens" => params.max_tokens = value.parse().map_err(|e| invalid(name, e))?,
        "top_p" => params.top_p = value.parse().map_err(|e| invalid(name, e))?,
        "presence_penalty" => params.presence_penalty = value.parse().map_err(|e| invalid(name, e))?,
        "frequency_penalty" => params.frequency_penalty = value.parse().map_err(|e| invalid(name, e))?,
        "seed" => {
            params.seed = match value {
                "none" | "" => None,
                v => Some(v.parse().map_err(|e| invalid(name, e))?),
            }
        }
        other => anyhow::bail!("unknown parameter '{}'", other),
    }
    Ok(())
}

pub fn run(args: PromptArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;
    let ws = &mut session.ws;

    let code = match args.cmd {
        PromptSub::SetSection { section, text } => {
            let Some(section) = parse_section(&section) else {
                return Ok(exit_codes::CONFIG_ERROR);
            };
            ws.set_section(section, text);
            exit_codes::OK
        }
        PromptSub::ToggleSection { section } => {
            let Some(section) = parse_section(&section) else {
                return Ok(exit_codes::CONFIG_ERROR);
            };
            let on = ws.toggle_section(section);
            println!("{}: {}", section.key(), if on { "on" } else { "off" });
            exit_codes::OK
        }
        PromptSub::SetModels { models } => {
            ws.set_selected_models(models);
            exit_codes::OK
        }
        PromptSub::SetTools { tools } => {
            ws.set_selected_tools(tools);
            exit_codes::OK
        }
        PromptSub::SetParam { name, value } => {
            let mut params = ws.editor().parameters.clone();
            if let Err(e) = apply_param(&mut params, &name, &value) {
                eprintln!("{}", e);
                return Ok(exit_codes::CONFIG_ERROR);
            }
            ws.set_parameters(params);
            exit_codes::OK
        }
        PromptSub::AddHint { text } => {
            let hint = ws.add_hint(text);
            println!("{}", hint.id);
            exit_codes::OK
        }
        PromptSub::RemoveHint { id } => mutation_code(ws.remove_hint(&id), &format!("hint {}", id)),
        PromptSub::Show => {
            let editor = ws.editor();
            println!("models: {}", editor.selected_models.join(", "));
            println!("tools: {}", editor.selected_tools.join(", "));
            for section in SystemPromptSection::ALL {
                let state = if section_enabled(&editor.is_system_prompt_on, section) {
                    "on"
                } else {
                    "off"
                };
                println!(
                    "  [{}] {:<18} {} chars",
                    state,
                    section.key(),
                    editor.system_prompt.get(section).chars().count()
                );
            }
            let p = &editor.parameters;
            println!(
                "parameters: temperature={} max_tokens={} top_p={} presence_penalty={} frequency_penalty={} seed={}",
                p.temperature,
                p.max_tokens,
                p.top_p,
                p.presence_penalty,
                p.frequency_penalty,
                p.seed.map_or_else(|| "none".to_string(), |s| s.to_string())
            );
            for hint in &editor.hint_messages {
                println!("hint {}: {}", hint.id, hint.content);
            }
            println!("\n{}", ws.composed_system_prompt());
            return Ok(exit_codes::OK);
        }
    };

    session.save()?;
    Ok(code)
}
