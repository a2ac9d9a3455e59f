// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External converters — executable lookup and piped command recipes.
//
// Some formats cannot be fully counted natively (PostScript without trusted
// DSC comments, legacy word processor files) and ink coverage always needs a
// raster rendering. Both go through the helpers here: a recipe is a list of
// steps run one after another, and each step is a pipeline of stages whose
// stdout feeds the next stage's stdin.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Output, Stdio};

use tracing::{debug, instrument, warn};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

/// One program invocation. Arguments may contain the placeholders `{in}`,
/// `{out}`, `{tmp}` and `{dpi}`.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Stages connected stdout to stdin.
pub type Pipeline = &'static [Stage];

/// Pipelines run in sequence, sharing one intermediate scratch file `{tmp}`.
#[derive(Debug, Clone, Copy)]
pub struct Recipe {
    pub steps: &'static [Pipeline],
}

impl Recipe {
    /// Every program this recipe invokes.
    pub fn programs(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps
            .iter()
            .flat_map(|step| step.iter().map(|stage| stage.program))
    }
}

// -- Ghostscript stages shared by the render recipes --

/// Ghostscript rendering `{in}` to 24-bit TIFF.
pub const GS_TIFF_FROM_INPUT: Stage = Stage {
    program: "gs",
    args: &[
        "-sDEVICE=tiff24nc",
        "-dPARANOIDSAFER",
        "-dNOPAUSE",
        "-dBATCH",
        "-dQUIET",
        "-r{dpi}",
        "-sOutputFile={out}",
        "{in}",
    ],
};

/// Ghostscript rendering whatever arrives on stdin.
pub const GS_TIFF_FROM_STDIN: Stage = Stage {
    program: "gs",
    args: &[
        "-sDEVICE=tiff24nc",
        "-dPARANOIDSAFER",
        "-dNOPAUSE",
        "-dBATCH",
        "-dQUIET",
        "-r{dpi}",
        "-sOutputFile={out}",
        "-",
    ],
};

/// Ghostscript rendering the intermediate file of a two-step recipe.
pub const GS_TIFF_FROM_INTERMEDIATE: Stage = Stage {
    program: "gs",
    args: &[
        "-sDEVICE=tiff24nc",
        "-dPARANOIDSAFER",
        "-dNOPAUSE",
        "-dBATCH",
        "-dQUIET",
        "-r{dpi}",
        "-sOutputFile={out}",
        "{tmp}",
    ],
};

/// Values substituted into stage arguments.
#[derive(Debug, Clone, Copy)]
pub struct Substitutions<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub intermediate: &'a Path,
    pub dpi: u32,
}

impl Substitutions<'_> {
    /// Expand the placeholders in one argument template. Unknown `{...}`
    /// sequences are passed through untouched.
    pub fn expand(&self, template: &str) -> OsString {
        let mut expanded = OsString::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            let key = &rest[open + 1..open + close];
            let value = match key {
                "in" => Some(self.input.as_os_str().to_owned()),
                "out" => Some(self.output.as_os_str().to_owned()),
                "tmp" => Some(self.intermediate.as_os_str().to_owned()),
                "dpi" => Some(OsString::from(self.dpi.to_string())),
                _ => None,
            };
            match value {
                Some(value) => {
                    expanded.push(&rest[..open]);
                    expanded.push(value);
                }
                None => expanded.push(&rest[..=open + close]),
            }
            rest = &rest[open + close + 1..];
        }
        expanded.push(rest);
        expanded
    }
}

// -- Executable lookup --

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Locate `name` on the `PATH`. Names containing a path separator are
/// checked as given.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Whether a requirement is satisfied. `"a2ps|enscript"` means either one.
pub fn requirement_met(requirement: &str) -> bool {
    requirement
        .split('|')
        .any(|name| find_executable(name.trim()).is_some())
}

/// Fail with [`PagetallyError::MissingDependency`] for the first unmet requirement.
pub fn ensure_available(format: PdlFormat, requirements: &[&str]) -> Result<()> {
    match requirements.iter().find(|req| !requirement_met(req)) {
        Some(missing) => Err(PagetallyError::MissingDependency {
            format: format.display_name(),
            command: (*missing).to_string(),
        }),
        None => Ok(()),
    }
}

// -- Running commands --

fn describe(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

fn reap(children: Vec<(&'static str, Child)>) {
    for (program, mut child) in children {
        if let Err(err) = child.kill().and_then(|()| child.wait().map(drop)) {
            debug!(program, error = %err, "could not reap converter");
        }
    }
}

/// Run one pipeline to completion. Every stage must exit successfully.
pub fn run_pipeline(stages: &[Stage], subs: &Substitutions<'_>) -> Result<()> {
    let mut children: Vec<(&'static str, Child)> = Vec::with_capacity(stages.len());
    let mut upstream: Option<ChildStdout> = None;

    for (index, stage) in stages.iter().enumerate() {
        let last = index + 1 == stages.len();
        let args: Vec<OsString> = stage.args.iter().map(|arg| subs.expand(arg)).collect();
        debug!(command = %describe(stage.program, &args), "spawning converter");

        let stdin = match upstream.take() {
            Some(stdout) => Stdio::from(stdout),
            None => Stdio::null(),
        };
        let stdout = if last { Stdio::null() } else { Stdio::piped() };

        let spawned = Command::new(stage.program)
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                reap(children);
                return Err(PagetallyError::Conversion(format!(
                    "could not start {}: {err}",
                    stage.program
                )));
            }
        };
        upstream = child.stdout.take();
        children.push((stage.program, child));
    }

    wait_all(children)
}

/// Wait for every stage, even after one has failed. The first failure wins.
fn wait_all(children: Vec<(&'static str, Child)>) -> Result<()> {
    let mut failure = None;
    for (program, mut child) in children {
        let detail = match child.wait() {
            Ok(status) if status.success() => continue,
            Ok(status) => format!("{program} exited with {status}"),
            Err(err) => format!("could not wait for {program}: {err}"),
        };
        debug!(program, %detail, "converter failed");
        failure.get_or_insert(detail);
    }
    match failure {
        Some(detail) => Err(PagetallyError::Conversion(detail)),
        None => Ok(()),
    }
}

/// Run every step of `recipe` in order.
pub fn run_recipe(recipe: &Recipe, subs: &Substitutions<'_>) -> Result<()> {
    for step in recipe.steps {
        run_pipeline(step, subs)?;
    }
    Ok(())
}

/// Run a single command and collect its output. Spawn failures are
/// reported as [`PagetallyError::Conversion`]; the exit status is left to
/// the caller.
pub fn capture_output(program: &str, args: &[OsString]) -> Result<Output> {
    debug!(command = %describe(program, args), "running helper");
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| PagetallyError::Conversion(format!("could not start {program}: {err}")))
}

/// Render `input` to a multi-page TIFF at `output` with the first usable recipe.
///
/// Recipes whose programs are all installed are tried in order until one
/// produces a non-empty file. When none is installed the first missing
/// program of the first recipe is reported.
#[instrument(skip(recipes, input, output, scratch_dir), fields(input = %input.display()))]
pub fn render_tiff(
    format: PdlFormat,
    recipes: &[Recipe],
    input: &Path,
    output: &Path,
    dpi: u32,
    scratch_dir: &Path,
) -> Result<()> {
    let Some(first) = recipes.first() else {
        return Err(PagetallyError::Conversion(format!(
            "ink coverage is not available for {format} data"
        )));
    };

    let usable: Vec<&Recipe> = recipes
        .iter()
        .filter(|recipe| recipe.programs().all(requirement_met))
        .collect();
    if usable.is_empty() {
        let missing = first
            .programs()
            .find(|program| !requirement_met(program))
            .unwrap_or_default();
        return Err(PagetallyError::MissingDependency {
            format: format.display_name(),
            command: missing.to_string(),
        });
    }

    let intermediate = tempfile::Builder::new()
        .prefix("pagetally_")
        .suffix(".ps")
        .tempfile_in(scratch_dir)?;
    let subs = Substitutions {
        input,
        output,
        intermediate: intermediate.path(),
        dpi,
    };

    let mut last_error = None;
    for recipe in usable {
        match run_recipe(recipe, &subs) {
            Ok(()) => {
                let rendered = std::fs::metadata(output).map(|meta| meta.len()).unwrap_or(0);
                if rendered > 0 {
                    debug!(bytes = rendered, "rendered job to TIFF");
                    return Ok(());
                }
                last_error = Some(PagetallyError::Conversion(format!(
                    "conversion of {format} data to TIFF produced no output"
                )));
            }
            Err(err) => {
                warn!(error = %err, "TIFF conversion attempt failed");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        PagetallyError::Conversion(format!("could not convert {format} data to TIFF"))
    }))
}
