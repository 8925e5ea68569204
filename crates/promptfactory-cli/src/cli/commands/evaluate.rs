use super::{build_client, exit_codes, mutation_code, resolve_version, Session};
use crate::cli::args::EvaluateArgs;
use promptfactory_core::config::FactoryConfig;
use promptfactory_core::messages::BucketKey;
use promptfactory_core::model::{compose_system_prompt, Role};
use promptfactory_metrics::JudgeEvaluator;

pub async fn run(args: EvaluateArgs, cfg: &FactoryConfig) -> anyhow::Result<i32> {
    let mut session = Session::open(cfg)?;
    let Some(version) = resolve_version(&session.ws, &args.version) else {
        return Ok(exit_codes::REFUSED);
    };

    // the version's own compare conversation wins over the plain one
    let compare_bucket = BucketKey::compare(version.id.clone(), args.model.clone());
    let bucket = if session.ws.messages().message_count(&compare_bucket) > 0 {
        compare_bucket
    } else {
        BucketKey::model(args.model.clone())
    };
    let transcript = session.ws.messages().get_messages(&bucket);
    if !transcript.iter().any(|m| m.role == Role::Assistant) {
        eprintln!(
            "no conversation with {} to evaluate (run `chat send` first)",
            args.model
        );
        return Ok(exit_codes::REFUSED);
    }

    let judge = JudgeEvaluator::new(build_client(cfg)?, &cfg.judge);
    let system_prompt =
        compose_system_prompt(&version.data.system_prompt, &version.data.is_system_prompt_on);
    let original = version.accuracy_for(&args.model).unwrap_or(0.0);

    let evaluation = match judge.evaluate(&system_prompt, &transcript, original).await {
        Ok(e) => e,
        Err(e) => {
            eprintln!("evaluation failed: {:#}", e);
            return Ok(exit_codes::REFUSED);
        }
    };

    let ws = &mut session.ws;
    let recorded = ws.record_accuracy(&version.id, &args.model, evaluation.final_accuracy);
    if !recorded.is_applied() {
        tracing::warn!(
            event = "promptfactory.cli.accuracy_not_recorded",
            version = %version.id,
            model = %args.model,
            outcome = ?recorded,
            "accuracy was not recorded"
        );
        return Ok(mutation_code(recorded, &version.name));
    }
    let result = ws.record_test_result(&version.id, &args.model, &bucket);

    let s = &evaluation.scores;
    println!("version:    {} ({})", version.name, args.model);
    println!(
        "judge:      overall={:.1} instructions={:.1} helpfulness={:.1} clarity={:.1}",
        s.overall_quality, s.instruction_following, s.helpfulness, s.clarity
    );
    println!("feedback:   {} good, {} bad", evaluation.good, evaluation.bad);
    println!(
        "accuracy:   {:.1} -> {:.1}",
        evaluation.original_accuracy, evaluation.final_accuracy
    );
    println!("rationale:  {}", s.rationale);
    eprintln!("recorded test result {}", result.id);

    session.save()?;
    Ok(exit_codes::OK)
}
