use crate::model::{ModelMessage, Rating, Role, SavedVersion};
use crate::rating::{strict_leader, RatingBook};
use std::fmt::Write;

const UNTESTED: &str = "untested";

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn fmt_score(score: Option<f64>) -> String {
    score.map_or_else(|| UNTESTED.to_string(), |s| format!("{:.2}", s))
}

pub fn render_versions(versions: &[SavedVersion]) -> String {
    let mut out = String::new();
    if versions.is_empty() {
        out.push_str("No saved versions.\n");
        return out;
    }
    for v in versions {
        let accuracy: Vec<String> = v
            .data
            .models
            .iter()
            .map(|m| match v.accuracy_for(m) {
                Some(a) => format!("{m}={a:.1}"),
                None => format!("{m}={UNTESTED}"),
            })
            .collect();
        let _ = writeln!(
            out,
            "{}  {:<24} {}  [{}]",
            short_id(&v.id),
            v.name,
            v.saved_at,
            accuracy.join(", ")
        );
    }
    out
}

pub fn render_conversation(messages: &[ModelMessage]) -> String {
    let mut out = String::new();
    for m in messages {
        let who = match m.role {
            Role::User => "you",
            Role::Assistant => m.model.as_deref().unwrap_or("assistant"),
            Role::System => "system",
        };
        let body = m.content.as_deref().unwrap_or("…");
        let rating = match m.rating {
            Some(Rating::Good) => " 👍",
            Some(Rating::Bad) => " 👎",
            None => "",
        };
        let timing = m
            .spend_time
            .map(|ms| format!(" ({ms} ms)"))
            .unwrap_or_default();
        let _ = writeln!(out, "[{}] {}: {}{}{}", short_id(&m.id), who, body, timing, rating);
    }
    out
}

/// Rubric rows, then category and overall averages, one column per
/// version. The strict leader of each row is starred.
pub fn render_comparison(book: &RatingBook, versions: &[&SavedVersion]) -> String {
    let mut out = String::new();
    let ids: Vec<&str> = versions.iter().map(|v| v.id.as_str()).collect();

    let _ = write!(out, "{:<32}", "rubric");
    for v in versions {
        let _ = write!(out, " {:>14}", v.name);
    }
    out.push('\n');

    let mut row = |label: String, scores: Vec<Option<f64>>| {
        let leader = strict_leader(&scores);
        let _ = write!(out, "{:<32}", label);
        for s in &scores {
            let mark = if s.is_some() && *s == leader { "*" } else { "" };
            let _ = write!(out, " {:>14}", format!("{}{}", fmt_score(*s), mark));
        }
        out.push('\n');
    };

    for rubric_id in book.rubrics_for_display(&ids) {
        let scores = ids.iter().map(|v| book.rubric_average(v, &rubric_id)).collect();
        row(book.rubric_display_label(&rubric_id), scores);
    }

    let mut categories = book.categories().to_vec();
    categories.sort_by_key(|c| c.order);
    for c in categories {
        let scores = ids.iter().map(|v| book.category_average(v, &c.id)).collect();
        row(format!("[{}]", c.name), scores);
    }
    let overall = ids.iter().map(|v| book.overall_average(v)).collect();
    row("overall".to_string(), overall);

    out
}

pub fn print_versions(versions: &[SavedVersion]) {
    print!("{}", render_versions(versions));
}

pub fn print_conversation(messages: &[ModelMessage]) {
    print!("{}", render_conversation(messages));
}

pub fn print_comparison(book: &RatingBook, versions: &[&SavedVersion]) {
    print!("{}", render_comparison(book, versions));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionData;
    use crate::versions::VersionStore;

    #[test]
    fn test_comparison_marks_only_strict_leader() {
        let mut store = VersionStore::new();
        let data = VersionData {
            models: vec!["m".into()],
            ..VersionData::default()
        };
        let a = store.add_version(data.clone(), "alpha");
        let b = store.add_version(data, "beta");

        let mut book = RatingBook::new();
        let cat = book.add_category("Quality");
        let r1 = book.add_rubric(&cat.id, "Accurate").unwrap();
        let r2 = book.add_rubric(&cat.id, "Concise").unwrap();
        assert!(book.set_score(&a.id, "m", &r1.id, 4.0).is_applied());
        assert!(book.set_score(&b.id, "m", &r1.id, 2.0).is_applied());
        assert!(book.set_score(&a.id, "m", &r2.id, 3.0).is_applied());
        assert!(book.set_score(&b.id, "m", &r2.id, 3.0).is_applied());

        let text = render_comparison(&book, &[&a, &b]);
        let accurate = text.lines().find(|l| l.starts_with("Accurate")).unwrap();
        assert!(accurate.contains("4.00*"));
        assert!(!accurate.contains("2.00*"));
        let concise = text.lines().find(|l| l.starts_with("Concise")).unwrap();
        assert!(!concise.contains('*'));
    }

    #[test]
    fn test_unscored_versions_render_untested() {
        let mut store = VersionStore::new();
        let a = store.add_version(VersionData::default(), "alpha");
        let book = RatingBook::new();
        let text = render_comparison(&book, &[&a]);
        let overall = text.lines().find(|l| l.starts_with("overall")).unwrap();
        assert!(overall.contains(UNTESTED));
        assert!(!overall.contains("0.00"));
    }

    #[test]
    fn test_pending_reply_renders_ellipsis() {
        let msg = ModelMessage {
            id: "0123456789".into(),
            role: Role::Assistant,
            content: None,
            rating: None,
            spend_time: None,
            model: Some("gpt-4o".into()),
        };
        assert_eq!(render_conversation(&[msg]), "[01234567] gpt-4o: …\n");
    }
}
