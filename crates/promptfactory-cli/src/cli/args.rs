use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "promptfactory",
    version,
    about = "Author, version, compare and rate system prompts across LLMs"
)]
pub struct Cli {
    #[arg(long, global = true, default_value = "promptfactory.yaml", env = "PROMPTFACTORY_CONFIG")]
    pub config: PathBuf,

    /// reject unknown config keys instead of warning
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample config
    Init(InitArgs),
    /// Edit the working prompt
    Prompt(PromptArgs),
    /// Manage saved versions
    Version(VersionArgs),
    /// Talk to the selected models
    Chat(ChatArgs),
    /// Side-by-side comparison of saved versions
    Compare(CompareArgs),
    /// Rating categories and rubrics
    Rubric(RubricArgs),
    /// Record rubric scores
    Score(ScoreArgs),
    /// Rubric comparison table for one or more versions
    Report(ReportArgs),
    /// Judge a version's conversation and update its accuracy
    Evaluate(EvaluateArgs),
    /// Test message datasets
    Dataset(DatasetArgs),
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    /// also write a .gitignore for the workspace database
    #[arg(long)]
    pub gitignore: bool,
}

#[derive(Parser, Clone)]
pub struct PromptArgs {
    #[command(subcommand)]
    pub cmd: PromptSub,
}

#[derive(Subcommand, Clone)]
pub enum PromptSub {
    /// Replace the text of one section (characterSettings, backgroundInfo, ...)
    SetSection { section: String, text: String },
    /// Flip a section on or off
    ToggleSection { section: String },
    SetModels {
        #[arg(required = true)]
        models: Vec<String>,
    },
    SetTools { tools: Vec<String> },
    /// temperature | max_tokens | top_p | presence_penalty | frequency_penalty | seed
    SetParam { name: String, value: String },
    AddHint { text: String },
    RemoveHint { id: String },
    Show,
}

#[derive(Parser, Clone)]
pub struct VersionArgs {
    #[command(subcommand)]
    pub cmd: VersionSub,
}

#[derive(Subcommand, Clone)]
pub enum VersionSub {
    /// Snapshot the working prompt; blank names get "Untitled N"
    Save {
        #[arg(default_value = "")]
        name: String,
    },
    List {
        /// case-insensitive name filter
        #[arg(long)]
        filter: Option<String>,
    },
    Show { version: String },
    Rename { version: String, name: String },
    Delete { version: String },
    Duplicate { version: String },
    /// Copy a version back into the working prompt
    Load { version: String },
    Export {
        version: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Import { file: PathBuf },
}

#[derive(Parser, Clone)]
pub struct ChatArgs {
    #[command(subcommand)]
    pub cmd: ChatSub,
}

#[derive(Subcommand, Clone)]
pub enum ChatSub {
    Send { text: String },
    Show {
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        version: Option<String>,
    },
    /// good | bad | none
    Rate {
        message: String,
        rating: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        version: Option<String>,
    },
    Clear,
}

#[derive(Parser, Clone)]
pub struct CompareArgs {
    #[command(subcommand)]
    pub cmd: CompareSub,
}

#[derive(Subcommand, Clone)]
pub enum CompareSub {
    Start,
    Toggle { version: String },
    Confirm,
    Cancel,
    Reorder { from: usize, to: usize },
    Exit,
    Show,
}

#[derive(Parser, Clone)]
pub struct RubricArgs {
    #[command(subcommand)]
    pub cmd: RubricSub,
}

#[derive(Subcommand, Clone)]
pub enum RubricSub {
    AddCategory { name: String },
    Add { category: String, content: String },
    Retire { rubric: String },
    List,
}

#[derive(Parser, Clone)]
pub struct ScoreArgs {
    #[command(subcommand)]
    pub cmd: ScoreSub,
}

#[derive(Subcommand, Clone)]
pub enum ScoreSub {
    /// Record a 0-5 score
    Set {
        version: String,
        model: String,
        rubric: String,
        score: f64,
    },
    Clear {
        version: String,
        model: String,
        rubric: String,
    },
}

#[derive(Parser, Clone)]
pub struct ReportArgs {
    #[arg(required = true)]
    pub versions: Vec<String>,
}

#[derive(Parser, Clone)]
pub struct EvaluateArgs {
    pub version: String,
    #[arg(long)]
    pub model: String,
}

#[derive(Parser, Clone)]
pub struct DatasetArgs {
    #[command(subcommand)]
    pub cmd: DatasetSub,
}

#[derive(Subcommand, Clone)]
pub enum DatasetSub {
    Add {
        name: String,
        #[arg(required = true)]
        messages: Vec<String>,
    },
    Remove { dataset: String },
    Hide { dataset: String },
    Unhide { dataset: String },
    List,
}
