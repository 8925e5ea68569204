pub const GITIGNORE: &str = "/.promptfactory/\n*.db\n*.db-shm\n*.db-wal\n";

/// What the offline provider answers when asked to judge a conversation.
pub const FAKE_JUDGE_REPLY: &str = r#"```json
{
  "overall_quality": 80,
  "instruction_following": 85,
  "helpfulness": 75,
  "clarity": 90,
  "rationale": "Offline judge: fixed scores."
}
```"#;
