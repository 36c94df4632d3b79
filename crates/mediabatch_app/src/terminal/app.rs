use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use batch_logging::{batch_info, batch_warn};
use mediabatch_app::command::{parse_command, Command, HELP};
use mediabatch_app::config::Settings;
use mediabatch_app::render::{catalog_lines, Renderer};
use mediabatch_core::{update, AppState, Msg, Phase};

use super::effects::EffectRunner;

/// Render and event-drain cadence.
const TICK: Duration = Duration::from_millis(100);

enum Input {
    Line(String),
    Closed,
    Tick,
}

/// `--yes` mode: start once the catalog arrives, exit when the batch ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoRun {
    Analyzing,
    Downloading,
}

pub fn run(settings: Settings) -> Result<()> {
    let (input_tx, input_rx) = mpsc::channel::<Input>();
    spawn_stdin_reader(input_tx.clone());
    spawn_ticker(input_tx);

    let mut app = App::new(&settings);
    println!("Downloads go to {}", settings.directory.display());
    match &settings.url {
        Some(url) => app.dispatch_all(vec![Msg::UrlChanged(url.clone()), Msg::AnalyzeClicked]),
        None => println!("{HELP}"),
    }

    while let Ok(input) = input_rx.recv() {
        match input {
            Input::Tick => app.tick(),
            Input::Line(line) => {
                app.progress_open = false;
                match parse_command(&line) {
                    Ok(Some(Command::Update(msgs))) => {
                        app.dispatch_all(msgs);
                        app.render();
                    }
                    Ok(Some(Command::List)) => {
                        let lines = catalog_lines(&app.state.view());
                        app.print_lines(lines);
                    }
                    Ok(Some(Command::Help)) => app.print_lines(vec![HELP.to_string()]),
                    Ok(Some(Command::Quit)) => break,
                    Ok(None) => {}
                    Err(err) => app.print_lines(vec![err.to_string()]),
                }
            }
            Input::Closed => {
                if app.auto.is_none() {
                    batch_info!("Input closed; exiting");
                    break;
                }
            }
        }
        if app.outcome.is_some() {
            break;
        }
    }

    app.shutdown()
}

struct App {
    state: AppState,
    runner: EffectRunner,
    renderer: Renderer,
    auto: Option<AutoRun>,
    interactive: bool,
    /// A progress line is on screen without a trailing newline.
    progress_open: bool,
    outcome: Option<Result<()>>,
}

impl App {
    fn new(settings: &Settings) -> Self {
        Self {
            state: AppState::with_options(settings.options),
            runner: EffectRunner::new(settings),
            renderer: Renderer::default(),
            auto: settings.auto_start.then_some(AutoRun::Analyzing),
            interactive: io::stdout().is_terminal(),
            progress_open: false,
            outcome: None,
        }
    }

    fn dispatch_all(&mut self, msgs: Vec<Msg>) {
        for msg in msgs {
            self.dispatch(msg);
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let follow_up = self.auto_follow_up(&msg);
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        let feedback = self.runner.enqueue(effects);
        for msg in feedback.into_iter().chain(follow_up) {
            self.dispatch(msg);
        }
        self.check_auto_finished();
    }

    fn auto_follow_up(&mut self, msg: &Msg) -> Option<Msg> {
        if self.auto != Some(AutoRun::Analyzing) {
            return None;
        }
        match msg {
            Msg::CatalogReady(items) if !items.is_empty() => {
                self.auto = Some(AutoRun::Downloading);
                Some(Msg::StartClicked)
            }
            Msg::CatalogReady(_) => {
                self.outcome = Some(Err(anyhow!("nothing to download")));
                None
            }
            Msg::CatalogFailed { message, .. } => {
                self.outcome = Some(Err(anyhow!("analysis failed: {message}")));
                None
            }
            _ => None,
        }
    }

    fn check_auto_finished(&mut self) {
        if self.auto != Some(AutoRun::Downloading) || self.outcome.is_some() {
            return;
        }
        match self.state.phase() {
            Phase::Finished => self.outcome = Some(Ok(())),
            Phase::Cancelled => {
                let status = self.state.view().status.unwrap_or_default();
                self.outcome = Some(Err(anyhow!("batch cancelled: {status}")));
            }
            _ => {}
        }
    }

    fn tick(&mut self) {
        let msgs = self.runner.drain();
        self.dispatch_all(msgs);
        if self.state.consume_dirty() {
            self.render();
        }
    }

    fn render(&mut self) {
        let frame = self.renderer.frame(&self.state.view());
        self.print_lines(frame.lines);
        if let (Some(progress), true) = (frame.progress, self.interactive) {
            print!("\r\x1b[2K{progress}");
            let _ = io::stdout().flush();
            self.progress_open = true;
        }
    }

    fn print_lines(&mut self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        if std::mem::take(&mut self.progress_open) {
            println!();
        }
        for line in lines {
            println!("{line}");
        }
    }

    fn shutdown(mut self) -> Result<()> {
        self.runner.shutdown();
        // Whatever the worker said on the way out.
        self.tick();
        if self.progress_open {
            println!();
        }
        self.outcome.take().unwrap_or(Ok(()))
    }
}

fn spawn_stdin_reader(tx: mpsc::Sender<Input>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    batch_warn!("Reading input failed: {}", err);
                    break;
                }
            }
        }
        let _ = tx.send(Input::Closed);
    });
}

fn spawn_ticker(tx: mpsc::Sender<Input>) {
    thread::spawn(move || {
        while tx.send(Input::Tick).is_ok() {
            thread::sleep(TICK);
        }
    });
}
