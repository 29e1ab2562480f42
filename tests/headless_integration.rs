use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use readalong::document::DocumentText;
use readalong::engine::{AudioEngine, ClockEngine};
use readalong::layout::TextLayout;
use readalong::narrator::{Narrator, NarratorSettings};
use readalong::runtime::{FixedTicker, ReaderEvent, Runner, TestEventSource};
use readalong::scroll::{ScrollCoordinator, Viewport};
use readalong::session::PlaybackState;
use readalong::synth::PacedSynthesizer;

fn paced_narrator(speed: f32) -> Narrator {
    let engine: Arc<dyn AudioEngine> = Arc::new(ClockEngine::default());
    let settings = NarratorSettings {
        speed,
        poll_interval: Duration::from_millis(10),
        ..NarratorSettings::default()
    };
    Narrator::new(engine, Arc::new(PacedSynthesizer), settings)
}

// Headless run of the real clock engine through the runtime loop, without a TTY.
// A space key starts playback once the document is ready; ticks drive polling
// until the narration finishes.
#[test]
fn headless_narration_plays_to_the_end() {
    let text = "hi there reader";
    let mut narrator = paced_narrator(2.0);
    narrator.load(DocumentText::from_text(text));

    let layout = TextLayout::new(&[text], 6);
    let mut coordinator = ScrollCoordinator::new();
    let mut viewport = Viewport::new(2);
    let mut visited = Vec::new();

    let (tx, rx) = mpsc::channel();
    let es = TestEventSource::new(rx);
    let ticker = FixedTicker::new(Duration::from_millis(5));
    let mut runner = Runner::new(es, ticker);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut sent_play = false;
    while Instant::now() < deadline {
        match runner.step() {
            ReaderEvent::Tick => {
                narrator.tick(Instant::now());
                narrator.pump();
                if !sent_play && narrator.state() == PlaybackState::Ready {
                    tx.send(ReaderEvent::Key(KeyEvent::new(
                        KeyCode::Char(' '),
                        KeyModifiers::NONE,
                    )))
                    .unwrap();
                    sent_play = true;
                }
                if let Some(request) = coordinator.observe(narrator.current_word(), &layout, 1) {
                    visited.push(request.index);
                    viewport.animate_to(request);
                }
                viewport.step();
            }
            ReaderEvent::Resize => {}
            ReaderEvent::Key(key) => {
                if key.code == KeyCode::Char(' ') {
                    narrator.toggle(Instant::now()).unwrap();
                }
            }
        }
        if narrator.state() == PlaybackState::Finished {
            break;
        }
    }

    assert_eq!(narrator.state(), PlaybackState::Finished);
    assert_eq!(
        narrator.session().position_ms(),
        narrator.table().last_end_ms().unwrap()
    );
    assert_eq!(narrator.current_word(), Some(2));
    // Every word got its turn, in order
    assert_eq!(visited.first(), Some(&0));
    assert_eq!(visited.last(), Some(&2));
    assert!(visited.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn headless_pause_holds_position() {
    let text = "one two three four five six seven eight nine ten";
    let mut narrator = paced_narrator(1.0);
    narrator.load(DocumentText::from_text(text));

    let deadline = Instant::now() + Duration::from_secs(2);
    while narrator.state() != PlaybackState::Ready {
        assert!(Instant::now() < deadline);
        narrator.wait(Duration::from_millis(10));
    }
    narrator.play(Instant::now()).unwrap();

    let until = Instant::now() + Duration::from_millis(300);
    while Instant::now() < until {
        narrator.tick(Instant::now());
        narrator.wait(Duration::from_millis(5));
    }
    narrator.pause().unwrap();
    let held = narrator.session().position_ms();
    assert!(held > 0);

    std::thread::sleep(Duration::from_millis(100));
    narrator.tick(Instant::now());
    narrator.pump();
    assert_eq!(narrator.state(), PlaybackState::Paused);
    assert_eq!(narrator.session().position_ms(), held);
}
