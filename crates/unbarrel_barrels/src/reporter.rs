use std::{
    env,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use colored::Colorize;
use log::{debug, trace};

use crate::types::{Explanation, RewriteReport};

/// Relativize a root-relative path to the current working directory for clickable links
fn relativize_to_cwd(root: &Path, relative_to_root: &str) -> String {
    let Ok(cwd) = env::current_dir() else {
        debug!("Failed to get current directory");
        return relative_to_root.to_string();
    };
    match make_relative(&root.join(relative_to_root), &cwd) {
        Some(rel_path) => rel_path.to_string_lossy().to_string(),
        None => {
            trace!("Could not relativize '{}', using original", relative_to_root);
            relative_to_root.to_string()
        }
    }
}

/// Create a relative path from `base` to `target`; `None` when they share no root.
fn make_relative(target: &Path, base: &Path) -> Option<PathBuf> {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    if target.first() != base.first() {
        return None;
    }
    let common = target.iter().zip(&base).take_while(|(t, b)| t == b).count();
    if common == target.len() {
        return Some(PathBuf::from("."));
    }

    let mut result = PathBuf::new();
    for _ in common..base.len() {
        result.push("..");
    }
    for component in &target[common..] {
        if let Component::Normal(p) = component {
            result.push(p);
        }
    }
    Some(result)
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn print_no_rewrites_message<W: Write>(writer: &mut W) -> io::Result<()> {
    writeln!(writer, "{} No barrel imports to rewrite.", "✓".green().bold())?;
    writer.flush()?;
    Ok(())
}

pub fn print_rewrites_tree<W: Write>(writer: &mut W, report: &RewriteReport) -> io::Result<()> {
    debug!("Printing rewrites for {} files", report.files.len());
    let (marker, heading) = if report.pending() > 0 {
        ("⚠".yellow().bold(), "Barrel imports found")
    } else {
        ("✓".green().bold(), "Barrel imports rewritten")
    };
    writeln!(writer, "{} {}\n", marker, heading)?;

    for file in &report.files {
        let display_path = relativize_to_cwd(&report.root, &file.file);
        writeln!(
            writer,
            "{} ({} statements)",
            display_path.blue(),
            file.rewrites.len().to_string().yellow()
        )?;

        for (idx, rewrite) in file.rewrites.iter().enumerate() {
            let is_last = idx == file.rewrites.len() - 1;
            let (prefix, indent) = if is_last { ("└──", "    ") } else { ("├──", "│   ") };
            writeln!(writer, "{}  {}", prefix.dimmed(), single_line(&rewrite.original).red())?;
            for line in rewrite.replacement.lines() {
                writeln!(writer, "{}  {} {}", indent.dimmed(), "→".dimmed(), line.green())?;
            }
        }
        writeln!(writer)?;
    }

    print_summary(writer, report)?;
    writer.flush()?;
    Ok(())
}

fn print_summary<W: Write>(writer: &mut W, report: &RewriteReport) -> io::Result<()> {
    let bindings: usize =
        report.files.iter().flat_map(|f| &f.rewrites).map(|r| r.bindings.len()).sum();

    writeln!(writer, "{}", "─".repeat(60).dimmed())?;
    writeln!(writer, "{}", "Summary".bold())?;
    writeln!(writer, "  Files with barrel imports: {}", report.files.len().to_string().yellow())?;
    writeln!(writer, "  Statements: {}", report.statements().to_string().yellow().bold())?;
    writeln!(writer, "  Direct imports: {}", bindings.to_string().cyan())?;
    writeln!(writer, "  Barrel files scanned: {}", report.barrels_scanned.to_string().cyan())?;
    if report.cached_packages > 0 {
        writeln!(writer, "  Packages cached: {}", report.cached_packages.to_string().cyan())?;
    }
    if report.pending() > 0 {
        writeln!(writer, "  Pending: {} (run with --write)", report.pending().to_string().red())?;
    }
    Ok(())
}

pub fn print_explanation<W: Write>(writer: &mut W, explanation: &Explanation) -> io::Result<()> {
    let resolved = &explanation.resolved;
    writeln!(
        writer,
        "{} from {}",
        explanation.specifier.bold(),
        explanation.from.display().to_string().blue()
    )?;
    if let Some(esm) = resolved.abs_esm_file() {
        writeln!(writer, "  ESM:      {}", esm.display())?;
    }
    if let Some(cjs) = resolved.abs_cjs_file() {
        writeln!(writer, "  CommonJS: {}", cjs.display())?;
    }
    writeln!(writer, "  Exports map: {}", resolved.used_manifest_exports_field())?;
    writeln!(writer, "  Barrel: {}", explanation.is_barrel)?;

    for (name, spec) in &explanation.names {
        match spec {
            Some(spec) => writeln!(
                writer,
                "  {} {} → {} ({})",
                "●".bright_blue(),
                name.bold(),
                spec.module_path.display().to_string().green(),
                spec.binding_name()
            )?,
            None => writeln!(writer, "  {} {} → {}", "●".bright_blue(), name.bold(), "-".dimmed())?,
        }
    }
    writer.flush()?;
    Ok(())
}
