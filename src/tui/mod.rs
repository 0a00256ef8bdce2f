//! Ratatui-based terminal UI.
//!
//! The TUI provides a settings panel for the rejection threshold, iteration
//! cap, and synthetic sample knobs, then renders the fitted curve with inliers
//! and rejected outliers per series.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Terminal,
};

use crate::app::pipeline::{RunOutput, run_fit, run_fit_with_table};
use crate::cli::FitArgs;
use crate::domain::FitConfig;
use crate::error::AppError;
use crate::io::ingest::SeriesTable;
use crate::models::ModelKind;

mod plotters_chart;

use plotters_chart::CvPlottersChart;

/// Start the TUI.
pub fn run(args: FitArgs) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(args)?;
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Settings fields, in display order.
const FIELD_THRESHOLD: usize = 0;
const FIELD_MAX_ITERATIONS: usize = 1;
const FIELD_SAMPLE_COUNT: usize = 2;
const FIELD_NOISE: usize = 3;
const FIELD_OUTLIER_PROB: usize = 4;
const FIELD_LAST: usize = FIELD_OUTLIER_PROB;

struct App {
    config: FitConfig,
    /// CSV table loaded once up front; `None` means synthetic data.
    base_table: Option<SeriesTable>,
    selected_field: usize,
    /// Index into `run.runs` of the series currently charted.
    selected_series: usize,
    status: String,
    run: Option<RunOutput>,
}

impl App {
    fn new(args: FitArgs) -> Result<Self, AppError> {
        let config = crate::app::fit_config_from_args(&args);
        let base_table = match &config.csv_path {
            Some(path) => Some(crate::io::ingest::load_series_table(path)?),
            None => None,
        };

        let mut app = Self {
            config,
            base_table,
            selected_field: 0,
            selected_series: 0,
            status: "Fitting...".to_string(),
            run: None,
        };
        app.refit();
        Ok(app)
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))? {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Up => {
                if self.selected_field > 0 {
                    self.selected_field -= 1;
                }
            }
            KeyCode::Down => {
                if self.selected_field < FIELD_LAST {
                    self.selected_field += 1;
                }
            }
            KeyCode::Left => self.adjust_field(-1),
            KeyCode::Right => self.adjust_field(1),
            KeyCode::Tab => {
                if let Some(run) = &self.run {
                    if !run.runs.is_empty() {
                        self.selected_series = (self.selected_series + 1) % run.runs.len();
                        self.status = format!("series: {}", run.runs[self.selected_series].fit.name);
                    }
                }
            }
            KeyCode::Char('r') => {
                if self.base_table.is_some() {
                    self.status = "CSV input; nothing to resample (r applies to demo data).".to_string();
                } else {
                    self.config.sample_seed = self.config.sample_seed.wrapping_add(1);
                    self.refit();
                    self.status = format!("Resampled (seed {}).", self.config.sample_seed);
                }
            }
            KeyCode::Char('m') => {
                self.config.model = next_model(self.config.model);
                self.refit();
                self.status = format!("model: {}", self.config.model.display_name());
            }
            _ => {}
        }

        false
    }

    fn adjust_field(&mut self, delta: i32) {
        match self.selected_field {
            FIELD_THRESHOLD => {
                let next = self.config.threshold + 0.25 * delta as f64;
                self.config.threshold = next.max(0.25);
                self.refit();
                self.status = format!("threshold: {:.2}", self.config.threshold);
            }
            FIELD_MAX_ITERATIONS => {
                let next = if delta >= 0 {
                    self.config.max_iterations.saturating_add(1)
                } else {
                    self.config.max_iterations.saturating_sub(1)
                };
                self.config.max_iterations = next.max(1);
                self.refit();
                self.status = format!("max iterations: {}", self.config.max_iterations);
            }
            FIELD_SAMPLE_COUNT => {
                if self.base_table.is_some() {
                    self.status = "Count applies to demo data only.".to_string();
                    return;
                }
                let next = if delta >= 0 {
                    self.config.sample_count.saturating_add(4)
                } else {
                    self.config.sample_count.saturating_sub(4)
                };
                self.config.sample_count = next.max(4);
                self.refit();
                self.status = format!("count: {}", self.config.sample_count);
            }
            FIELD_NOISE => {
                if self.base_table.is_some() {
                    self.status = "Noise applies to demo data only.".to_string();
                    return;
                }
                let next = self.config.sample_noise + 0.01 * delta as f64;
                self.config.sample_noise = next.clamp(0.0, 0.5);
                self.refit();
                self.status = format!("noise: {:.2}", self.config.sample_noise);
            }
            FIELD_OUTLIER_PROB => {
                if self.base_table.is_some() {
                    self.status = "Outlier probability applies to demo data only.".to_string();
                    return;
                }
                let next = self.config.sample_outlier_prob + 0.02 * delta as f64;
                self.config.sample_outlier_prob = next.clamp(0.0, 0.5);
                self.refit();
                self.status = format!("outlier prob: {:.2}", self.config.sample_outlier_prob);
            }
            _ => {}
        }
    }

    fn refit(&mut self) {
        let result = match &self.base_table {
            Some(table) => run_fit_with_table(&self.config, table.clone()),
            None => run_fit(&self.config),
        };

        match result {
            Ok(run) => {
                if self.selected_series >= run.runs.len() {
                    self.selected_series = 0;
                }
                self.run = Some(run);
                self.status = "Fitted.".to_string();
            }
            Err(err) => {
                // Keep the last good run on screen; a bad setting should not
                // tear the UI down.
                self.status = format!("Fit failed: {err}");
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("cv", Style::default().fg(Color::Cyan)),
            Span::raw(" — valve Cv curve fitter"),
        ]));

        let source = self
            .config
            .csv_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("demo (seed {})", self.config.sample_seed));

        lines.push(Line::from(Span::styled(
            format!(
                "source: {source} | model: {} | threshold: {:.2} | max iter: {}",
                self.config.model.display_name(),
                self.config.threshold,
                self.config.max_iterations,
            ),
            Style::default().fg(Color::Gray),
        )));

        if let Some(current) = self.current_run() {
            lines.push(Line::from(Span::styled(
                format!(
                    "{}: {} | iter {}{} | rmse={:.4} | outliers {}",
                    current.fit.name,
                    fmt_params(&current.fit),
                    current.fit.iterations,
                    if current.fit.converged { "" } else { " (cap)" },
                    current.fit.quality.rmse,
                    current.fit.quality.n_outliers,
                ),
                Style::default().fg(Color::Gray),
            )));
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(8)])
            .split(area);

        self.draw_chart(frame, chunks[0]);
        self.draw_settings(frame, chunks[1]);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = self
            .current_run()
            .map(|r| format!("Cv Curve — {}", r.fit.name))
            .unwrap_or_else(|| "Cv Curve".to_string());
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(current) = self.current_run() else {
            let msg = Paragraph::new("Waiting for data...")
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default());
            frame.render_widget(msg, inner);
            return;
        };

        let (curve, inliers, outliers, x_bounds, y_bounds) = chart_series(&self.config, current);

        let x_label = self
            .run
            .as_ref()
            .map(|r| r.table.x_label.clone())
            .unwrap_or_else(|| "flow".to_string());

        let widget = CvPlottersChart {
            curve: &curve,
            inliers: &inliers,
            outliers: &outliers,
            x_bounds,
            y_bounds,
            x_label,
            y_label: "dp",
            fmt_x: fmt_axis,
            fmt_y: fmt_axis,
        };

        frame.render_widget(widget, inner);
    }

    fn draw_settings(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items = vec![
            ListItem::new(format!("Threshold: {:.2} sigma", self.config.threshold)),
            ListItem::new(format!("Max iterations: {}", self.config.max_iterations)),
            ListItem::new(format!("Count: {}", self.config.sample_count)),
            ListItem::new(format!("Noise: {:.2}", self.config.sample_noise)),
            ListItem::new(format!("Outlier prob: {:.2}", self.config.sample_outlier_prob)),
        ];

        let list = List::new(items)
            .block(Block::default().title("Settings").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ratatui::widgets::ListState::default();
        state.select(Some(self.selected_field));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ select  ←/→ adjust  Tab series  r resample  m model  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn current_run(&self) -> Option<&crate::app::pipeline::SeriesRun> {
        self.run.as_ref().and_then(|r| r.runs.get(self.selected_series))
    }
}

/// Build chart series for Plotters.
fn chart_series(
    config: &FitConfig,
    run: &crate::app::pipeline::SeriesRun,
) -> (
    Vec<(f64, f64)>,
    Vec<(f64, f64)>,
    Vec<(f64, f64)>,
    [f64; 2],
    [f64; 2],
) {
    let mut x0 = f64::INFINITY;
    let mut x1 = f64::NEG_INFINITY;
    for p in &run.points {
        x0 = x0.min(p.x);
        x1 = x1.max(p.x);
    }
    if !x0.is_finite() || !x1.is_finite() || x1 <= x0 {
        x0 = 0.0;
        x1 = 1.0;
    }
    let x_bounds = [x0, x1];

    let mut inliers = Vec::new();
    let mut outliers = Vec::new();
    for p in &run.points {
        if p.inlier {
            inliers.push((p.x, p.y_obs));
        } else {
            outliers.push((p.x, p.y_obs));
        }
    }

    // Predict with the model the run was fitted with, not the currently
    // selected one: after a failed refit (e.g. `m` cycling to a model the
    // data cannot support) the last good run stays on screen, and its params
    // only match its own model's arity.
    let model = run.fit.model.build(config.k);
    let n = 200usize;
    let mut curve = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let x = x0 + u * (x1 - x0);
        curve.push((x, model.predict(x, &run.fit.params)));
    }

    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(_, y) in inliers.iter().chain(&outliers).chain(&curve) {
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if !y_min.is_finite() || !y_max.is_finite() || y_max <= y_min {
        y_min = 0.0;
        y_max = 1.0;
    }

    let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);
    let y_bounds = [y_min - pad, y_max + pad];

    (curve, inliers, outliers, x_bounds, y_bounds)
}

fn next_model(cur: ModelKind) -> ModelKind {
    match cur {
        ModelKind::Valve => ModelKind::PowerLaw,
        ModelKind::PowerLaw => ModelKind::Valve,
    }
}

fn fmt_params(fit: &crate::domain::SeriesFit) -> String {
    match fit.model {
        ModelKind::Valve => format!("Cv={:.4}", fit.params[0]),
        ModelKind::PowerLaw => format!("a={:.4} b={:.4}", fit.params[0], fit.params[1]),
    }
}

fn fmt_axis(v: f64) -> String {
    format!("{v:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, PointFit, Series, SeriesFit, SeriesPoint};
    use crate::models::DEFAULT_K;

    fn demo_run() -> crate::app::pipeline::SeriesRun {
        crate::app::pipeline::SeriesRun {
            series: Series {
                name: "valve_a".to_string(),
                points: vec![
                    SeriesPoint { x: 1.0, y: 0.25 },
                    SeriesPoint { x: 4.0, y: 4.0 },
                    SeriesPoint { x: 8.0, y: 48.0 },
                ],
            },
            fit: SeriesFit {
                name: "valve_a".to_string(),
                model: ModelKind::Valve,
                params: vec![2.0],
                mask: vec![true, true, false],
                iterations: 2,
                converged: true,
                quality: FitQuality { sse: 0.0, rmse: 0.0, n_inliers: 2, n_outliers: 1 },
            },
            points: vec![
                PointFit { x: 1.0, y_obs: 0.25, y_fit: 0.25, residual: 0.0, inlier: true },
                PointFit { x: 4.0, y_obs: 4.0, y_fit: 3.99, residual: 0.01, inlier: true },
                PointFit { x: 8.0, y_obs: 48.0, y_fit: 15.97, residual: 32.03, inlier: false },
            ],
        }
    }

    fn demo_config() -> FitConfig {
        FitConfig {
            csv_path: None,
            model: ModelKind::Valve,
            k: DEFAULT_K,
            threshold: 2.0,
            max_iterations: 5,
            plot: false,
            plot_width: 72,
            plot_height: 20,
            export_results: None,
            export_fit: None,
            sample_series: 1,
            sample_count: 8,
            sample_seed: 42,
            sample_cv: 2.0,
            sample_x_min: 1.0,
            sample_x_max: 8.0,
            sample_noise: 0.0,
            sample_outlier_prob: 0.0,
            sample_outlier_k: 3.0,
        }
    }

    #[test]
    fn chart_series_splits_inliers_and_outliers() {
        let (curve, inliers, outliers, x_bounds, y_bounds) = chart_series(&demo_config(), &demo_run());

        assert_eq!(curve.len(), 200);
        assert_eq!(inliers.len(), 2);
        assert_eq!(outliers, vec![(8.0, 48.0)]);
        assert_eq!(x_bounds, [1.0, 8.0]);
        // The injected outlier dominates the padded y-range.
        assert!(y_bounds[1] > 48.0);
        assert!(y_bounds[0] < 0.25);
    }

    #[test]
    fn chart_uses_the_run_model_when_the_selected_model_differs() {
        // `m` can cycle the selected model while the last good run on screen
        // was fitted with the other one (a refit may fail and be kept). The
        // curve must come from the run's own model; indexing the valve's
        // single parameter with power-law arity would be out of bounds.
        let mut config = demo_config();
        config.model = ModelKind::PowerLaw;

        let run = demo_run();
        let (curve, _, _, _, _) = chart_series(&config, &run);

        use crate::models::{Model, ValveCv};
        let model = ValveCv { k: config.k };
        for &(x, y) in &[curve[0], curve[199]] {
            assert!((y - model.predict(x, &run.fit.params)).abs() < 1e-12);
        }
    }

    #[test]
    fn model_cycles_between_the_two_kinds() {
        assert_eq!(next_model(ModelKind::Valve), ModelKind::PowerLaw);
        assert_eq!(next_model(ModelKind::PowerLaw), ModelKind::Valve);
    }
}
