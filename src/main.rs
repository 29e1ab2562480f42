mod ui;

use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use readalong::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    document::{extract_document, DocumentText},
    engine::{AudioEngine, ClockEngine},
    layout::TextLayout,
    logging::init_file_logging,
    narrator::Narrator,
    runtime::{CrosstermEventSource, FixedTicker, ReaderEvent, Runner},
    scroll::{ScrollCoordinator, Viewport},
    synth::{PacedSynthesizer, PiperSynthesizer, Synthesizer},
};

const SPEED_STEP: f32 = 0.25;
const VOLUME_STEP: f32 = 0.1;
const PAGE_ROWS: isize = 10;

/// read documents in the terminal while they are narrated, following the spoken word
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    /// document to read (.pdf, .txt, .md)
    path: PathBuf,

    /// playback speed, 0.5 to 2.0
    #[clap(short = 's', long)]
    speed: Option<f32>,

    /// playback volume, 0.0 to 1.0
    #[clap(short = 'v', long)]
    volume: Option<f32>,

    /// pace the highlighting without a speech engine
    #[clap(long)]
    silent: bool,

    /// start narrating as soon as the document is ready
    #[clap(short = 'a', long)]
    autoplay: bool,

    /// config file to use instead of the default location
    #[clap(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Flags win over the config file for this run.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        config
    }
}

pub struct App {
    pub narrator: Narrator,
    pub layout: TextLayout,
    pub scroll: ScrollCoordinator,
    pub viewport: Viewport,
    pub title: String,
    pub silent: bool,
    pub autoplay: bool,
    text_width: usize,
    text_height: usize,
}

impl App {
    pub fn new(narrator: Narrator, title: String, silent: bool, scroll_frames: u16) -> Self {
        Self {
            narrator,
            layout: TextLayout::default(),
            scroll: ScrollCoordinator::new(),
            viewport: Viewport::new(scroll_frames),
            title,
            silent,
            autoplay: false,
            text_width: 0,
            text_height: 0,
        }
    }

    pub fn load(&mut self, document: DocumentText) {
        self.narrator.load(document);
        self.relayout();
    }

    /// Fit the text to a new terminal size.
    pub fn resize(&mut self, width: u16, height: u16) {
        let (text_width, text_height) = ui::text_area(width, height);
        self.text_height = text_height;
        if text_width != self.text_width {
            self.text_width = text_width;
            self.relayout();
        }
    }

    fn relayout(&mut self) {
        self.layout = match self.narrator.session().document() {
            Some(document) => TextLayout::new(&document.paragraphs, self.text_width),
            None => TextLayout::default(),
        };
        self.scroll.invalidate();
    }

    pub fn on_tick(&mut self, now: Instant) {
        self.narrator.tick(now);
        self.narrator.pump();

        if self.autoplay && self.narrator.state() == readalong::PlaybackState::Ready {
            self.autoplay = false;
            let _ = self.narrator.play(now);
        }

        let current = self.narrator.current_word();
        if let Some(request) = self.scroll.observe(current, &self.layout, self.text_height) {
            self.viewport.animate_to(request);
        }
        self.viewport.step();
    }

    /// Returns true when the reader should quit.
    pub fn on_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        let rows = self.layout.rows().len();
        let result = match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Char(' ') => self.narrator.toggle(now),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let speed = self.narrator.session().speed() + SPEED_STEP;
                self.narrator.set_speed(speed)
            }
            KeyCode::Char('-') => {
                let speed = self.narrator.session().speed() - SPEED_STEP;
                self.narrator.set_speed(speed)
            }
            KeyCode::Char(']') => {
                let volume = self.narrator.session().volume() + VOLUME_STEP;
                self.narrator.set_volume(volume)
            }
            KeyCode::Char('[') => {
                let volume = self.narrator.session().volume() - VOLUME_STEP;
                self.narrator.set_volume(volume)
            }
            KeyCode::Char('r') => {
                let retried = self.narrator.retry();
                self.relayout();
                retried
            }
            KeyCode::Char('c') => {
                self.narrator.clear();
                self.relayout();
                self.viewport.reset();
                Ok(())
            }
            KeyCode::Char('x') => {
                self.narrator.dismiss_notice();
                Ok(())
            }
            KeyCode::Up => {
                self.viewport.scroll_by(-1, rows, self.text_height);
                Ok(())
            }
            KeyCode::Down => {
                self.viewport.scroll_by(1, rows, self.text_height);
                Ok(())
            }
            KeyCode::PageUp => {
                self.viewport.scroll_by(-PAGE_ROWS, rows, self.text_height);
                Ok(())
            }
            KeyCode::PageDown => {
                self.viewport.scroll_by(PAGE_ROWS, rows, self.text_height);
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, key = ?key.code, "key_action_rejected");
        }
        false
    }
}

fn build_synthesizer(config: &Config, silent: bool) -> (Arc<dyn Synthesizer>, bool) {
    if silent {
        return (Arc::new(PacedSynthesizer), true);
    }
    let model = config
        .voice_model
        .clone()
        .or_else(AppDirs::default_voice_model)
        .unwrap_or_default();
    let piper = PiperSynthesizer::locate(config.piper_path.as_deref(), model, AppDirs::audio_path());
    if piper.is_available() {
        (Arc::new(piper), false)
    } else {
        tracing::warn!(binary = %piper.binary().display(), "piper_not_found_pacing_silently");
        (Arc::new(PacedSynthesizer), true)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if let Some(log_path) = AppDirs::log_path() {
        // Reading still works without a log
        let _ = init_file_logging(&log_path);
    }

    let store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let config = cli.apply(store.load());

    let document = match extract_document(&cli.path) {
        Ok(document) => document,
        Err(e) => {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
        }
    };

    let player = if cli.silent { None } else { config.player() };
    let engine: Arc<dyn AudioEngine> = Arc::new(ClockEngine::new(player));
    let (synth, silent) = build_synthesizer(&config, cli.silent);
    let narrator = Narrator::new(engine, synth, config.narrator_settings());

    let title = cli
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut app = App::new(narrator, title, silent, config.scroll_frames);
    app.autoplay = cli.autoplay;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let size = terminal.size()?;
    app.resize(size.width, size.height);
    app.load(document);

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(config.frame_interval()),
    );
    let result = start_tui(&mut terminal, &mut app, runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    let session = app.narrator.session();
    let saved = Config {
        speed: session.speed(),
        volume: session.volume(),
        ..store.load()
    };
    if let Err(e) = store.save(&saved) {
        tracing::warn!(error = %e, "config_save_failed");
    }

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut runner: Runner<CrosstermEventSource, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    loop {
        match runner.step() {
            ReaderEvent::Tick => app.on_tick(Instant::now()),
            ReaderEvent::Resize => {
                let size = terminal.size()?;
                app.resize(size.width, size.height);
            }
            ReaderEvent::Key(key) => {
                if app.on_key(key, Instant::now()) {
                    break;
                }
            }
        }
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;
    }
    app.narrator.clear();
    Ok(())
}
