use super::{exit_codes, mutation_code, resolve_version, Session};
use crate::cli::args::{ReportArgs, RubricArgs, RubricSub, ScoreArgs, ScoreSub};
use promptfactory_core::config::FactoryConfig;
use promptfactory_core::rating::RatingBook;
use promptfactory_core::report::console;

/// Exact id, exact content, then a unique id prefix. Retired rubrics
/// resolve too.
fn resolve_rubric(book: &RatingBook, reference: &str) -> Option<String> {
    let all = || book.rubrics().iter().chain(book.history_rubrics());
    if let Some(r) = all().find(|r| r.id == reference || r.content == reference) {
        return Some(r.id.clone());
    }
    let mut prefixed = all().filter(|r| r.id.starts_with(reference));
    match (prefixed.next(), prefixed.next()) {
        (Some(r), None) if !reference.is_empty() => Some(r.id.clone()),
        _ => {
            eprintln!("rubric not found: {}", reference);
            None
        }
    }
}

pub fn run(args: RubricArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;
    let ws = &mut session.ws;

    let code = match args.cmd {
        RubricSub::AddCategory { name } => {
            let category = ws.add_category(&name);
            println!("{}  {}", category.id, category.name);
            exit_codes::OK
        }
        RubricSub::Add { category, content } => {
            let Some(category_id) = ws.ratings().find_category(&category).map(|c| c.id.clone())
            else {
                eprintln!("category not found: {}", category);
                return Ok(exit_codes::REFUSED);
            };
            match ws.add_rubric(&category_id, &content) {
                Some(rubric) => {
                    println!("{}  {}", rubric.id, rubric.content);
                    exit_codes::OK
                }
                None => exit_codes::REFUSED,
            }
        }
        RubricSub::Retire { rubric } => match resolve_rubric(ws.ratings(), &rubric) {
            Some(id) => mutation_code(ws.retire_rubric(&id), &rubric),
            None => exit_codes::REFUSED,
        },
        RubricSub::List => {
            let book = ws.ratings();
            let mut categories = book.categories().to_vec();
            categories.sort_by_key(|c| c.order);
            for c in &categories {
                println!("{}  [{}]", c.id, c.name);
                for r in book.rubrics().iter().filter(|r| r.category_id == c.id) {
                    println!("  {}  {}", r.id, book.rubric_display_label(&r.id));
                }
                for r in book.history_rubrics().iter().filter(|r| r.category_id == c.id) {
                    println!("  {}  {}", r.id, book.rubric_display_label(&r.id));
                }
            }
            return Ok(exit_codes::OK);
        }
    };

    session.save()?;
    Ok(code)
}

pub fn run_score(args: ScoreArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;
    let ws = &mut session.ws;

    let code = match args.cmd {
        ScoreSub::Set {
            version,
            model,
            rubric,
            score,
        } => {
            let (Some(v), Some(rid)) = (
                resolve_version(ws, &version),
                resolve_rubric(ws.ratings(), &rubric),
            ) else {
                return Ok(exit_codes::REFUSED);
            };
            mutation_code(
                ws.set_score(&v.id, &model, &rid, score),
                &format!("score {} for {} / {} (scores run 0-5)", score, v.name, model),
            )
        }
        ScoreSub::Clear {
            version,
            model,
            rubric,
        } => {
            let (Some(v), Some(rid)) = (
                resolve_version(ws, &version),
                resolve_rubric(ws.ratings(), &rubric),
            ) else {
                return Ok(exit_codes::REFUSED);
            };
            mutation_code(
                ws.clear_score(&v.id, &model, &rid),
                &format!("no score for {} / {}", v.name, model),
            )
        }
    };

    session.save()?;
    Ok(code)
}

pub fn run_report(args: ReportArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let session = Session::open(cfg)?;
    let ws = &session.ws;

    let mut versions = Vec::with_capacity(args.versions.len());
    for reference in &args.versions {
        match resolve_version(ws, reference) {
            Some(v) => versions.push(v),
            None => return Ok(exit_codes::REFUSED),
        }
    }
    let refs: Vec<_> = versions.iter().collect();
    console::print_comparison(ws.ratings(), &refs);
    Ok(exit_codes::OK)
}
