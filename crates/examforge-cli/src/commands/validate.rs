//! The `examforge validate` command.

use std::path::PathBuf;

use anyhow::Result;

use examforge_core::parser;

pub fn execute(path: PathBuf) -> Result<()> {
    let definitions = if path.is_dir() {
        parser::load_definition_directory(&path)?
    } else {
        vec![super::load_definition(&path)?]
    };

    let mut total_warnings = 0;

    for def in &definitions {
        println!(
            "Assessment: {} ({} questions, {})",
            def.name,
            def.question_count(),
            def.assess_type
        );
        if let Some(minutes) = def.time_limit_minutes() {
            println!("  time limit: {minutes} min");
        }

        let warnings = parser::validate_definition(def);
        for w in &warnings {
            let prefix = w
                .question
                .map(|n| format!("  [Q{n}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All assessments valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
