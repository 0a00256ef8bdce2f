//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads measurements (CSV or synthetic)
//! - runs the per-series robust fit
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;

use crate::cli::{Command, FitArgs, PlotArgs};
use crate::domain::FitConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `cv` binary.
pub fn run() -> Result<(), AppError> {
    // We want `cv` and `cv -n 50` to behave like `cv tui ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing. This preserves a clean clap structure while
    // retaining the requested UX.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fit(args) => handle_fit(args, InputMode::Csv),
        Command::Demo(args) => handle_fit(args, InputMode::Synthetic),
        Command::Plot(args) => handle_plot(args),
        Command::Tui(args) => handle_tui(args),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Csv,
    Synthetic,
}

fn handle_fit(args: FitArgs, mode: InputMode) -> Result<(), AppError> {
    let mut config = fit_config_from_args(&args);

    match mode {
        InputMode::Csv => {
            if config.csv_path.is_none() {
                config.csv_path = Some(crate::cli::picker::prompt_for_csv_path()?);
            }
        }
        InputMode::Synthetic => {
            config.csv_path = None;
        }
    }

    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_run_header(&config, &run.table.stats, &run.table.x_label)
    );
    print!("{}", crate::report::format_row_errors(&run.table.row_errors));

    for series_run in &run.runs {
        print!(
            "{}",
            crate::report::format_series_fit(&series_run.fit, &series_run.points)
        );

        if config.plot {
            let model = config.model.build(config.k);
            let plot = crate::plot::render_ascii_plot(
                &series_run.fit.name,
                &series_run.points,
                model.as_ref(),
                &series_run.fit.params,
                config.plot_width,
                config.plot_height,
            );
            println!("\n{plot}");
        }
    }

    print!("{}", crate::report::format_series_failures(&run.failures));

    // Optional exports.
    if let Some(path) = &config.export_results {
        let rows: Vec<(String, Vec<crate::domain::PointFit>)> = run
            .runs
            .iter()
            .map(|r| (r.fit.name.clone(), r.points.clone()))
            .collect();
        crate::io::export::write_results_csv(path, &rows)?;
    }
    if let Some(path) = &config.export_fit {
        let model = config.model.build(config.k);
        let fits: Vec<_> = run
            .runs
            .iter()
            .map(|r| (r.series.clone(), r.fit.clone()))
            .collect();
        crate::io::fitfile::write_fit_json(path, &config, model.as_ref(), &fits)?;
    }

    Ok(())
}

fn handle_tui(args: FitArgs) -> Result<(), AppError> {
    crate::tui::run(args)
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let fit = crate::io::fitfile::read_fit_json(&args.fit)?;

    for record in &fit.series {
        let plot = crate::plot::render_ascii_plot_from_record(record, args.width, args.height);
        println!("{plot}");
    }

    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        csv_path: args.file.clone(),
        model: args.model,
        k: args.k,
        threshold: args.threshold,
        max_iterations: args.max_iterations,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_results: args.export.clone(),
        export_fit: args.export_fit.clone(),
        sample_series: args.series,
        sample_count: args.sample_count,
        sample_seed: args.seed,
        sample_cv: args.cv,
        sample_x_min: args.x_min,
        sample_x_max: args.x_max,
        sample_noise: args.noise,
        sample_outlier_prob: args.outlier_prob,
        sample_outlier_k: args.outlier_k,
    }
}

/// Rewrite argv so `cv` defaults to `cv tui`.
///
/// Rules:
/// - `cv`                      -> `cv tui`
/// - `cv -n 50 ...`            -> `cv tui -n 50 ...`
/// - `cv --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "demo" | "plot" | "tui");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "tui flags".
    if arg1.starts_with('-') {
        argv.insert(1, "tui".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}
