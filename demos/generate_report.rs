//! Generate a PDF report from a transcript file.
//!
//! The transcript is a JSON array of `{"role": "user"|"assistant", "content": "..."}`
//! messages. Chromium must be installed (or `FOLIO_CHROMIUM` set).
//!
//! Run with:
//!   OPENAI_API_KEY=your_key cargo run --example generate_report chat.json "Heat Pumps" "Costs and efficiency" Dana
//!
//! Set `FOLIO_LLM=claude` (with `ANTHROPIC_API_KEY`) to use Claude, and
//! `FOLIO_DEDUP=0` to skip the overlap pass.

use folio::{LlmChoice, TitleInfo, load_transcript, run_generation};
use std::env;
use std::path::PathBuf;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        eprintln!("Usage: generate_report <transcript.json> [title] [subtitle] [user name]");
        std::process::exit(2);
    };
    let title = args.next().unwrap_or_else(|| "Research Report".to_string());
    let sub_title = args.next().unwrap_or_default();
    let user_name = args.next().unwrap_or_else(|| "Reader".to_string());

    let llm: LlmChoice = env::var("FOLIO_LLM")
        .unwrap_or_default()
        .parse()
        .unwrap_or_default();
    let dedup = env::var("FOLIO_DEDUP").map(|v| v != "0").unwrap_or(true);

    let transcript = match load_transcript(&path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n{}", "=".repeat(70));
    println!("  {} ({} messages, {})", title, transcript.len(), llm);
    println!("{}\n", "=".repeat(70));

    match run_generation(
        &transcript,
        &TitleInfo::new(title, sub_title),
        &user_name,
        llm,
        dedup,
    ) {
        Ok(pdf) => println!("Report written to {}", pdf.display()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
