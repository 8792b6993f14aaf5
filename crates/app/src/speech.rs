use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use poh_application::{ChunkTicket, SpeechEngine, SpeechEvent, Utterance};
use poh_core::Voice;

/// Words per minute at rate 1.0 for both espeak and `say`.
const BASE_WPM: f32 = 175.0;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A speech engine the CLI can block on for the next event.
pub trait SpeechDriver: SpeechEngine {
    fn next_event(&mut self) -> anyhow::Result<(ChunkTicket, SpeechEvent)>;
}

/// Prints each chunk instead of speaking it.
#[derive(Default)]
pub struct PrintSpeech {
    pending: VecDeque<(ChunkTicket, SpeechEvent)>,
}

impl SpeechEngine for PrintSpeech {
    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    fn speak(&mut self, utterance: Utterance) -> anyhow::Result<()> {
        println!("{}", utterance.text);
        self.pending.push_back((utterance.ticket, SpeechEvent::Started));
        self.pending.push_back((utterance.ticket, SpeechEvent::Ended));
        Ok(())
    }

    fn cancel(&mut self) {
        self.pending.clear();
    }
}

impl SpeechDriver for PrintSpeech {
    fn next_event(&mut self) -> anyhow::Result<(ChunkTicket, SpeechEvent)> {
        self.pending.pop_front().context("no utterance in flight")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    Espeak(PathBuf),
    Say(PathBuf),
}

type ChildSlot = Arc<Mutex<Option<Child>>>;

/// Speaks through a synthesizer process, one process per utterance.
pub struct CommandSpeech {
    backend: Backend,
    current: Option<ChildSlot>,
    tx: Sender<(ChunkTicket, SpeechEvent)>,
    rx: Receiver<(ChunkTicket, SpeechEvent)>,
}

impl CommandSpeech {
    /// Uses the first of `espeak-ng`, `espeak` or `say` found on `PATH`.
    pub fn detect() -> anyhow::Result<Self> {
        let paths = std::env::var_os("PATH").unwrap_or_default();
        let backend = find_in_dirs(&paths, "espeak-ng")
            .or_else(|| find_in_dirs(&paths, "espeak"))
            .map(Backend::Espeak)
            .or_else(|| find_in_dirs(&paths, "say").map(Backend::Say))
            .context("no speech synthesizer on PATH (tried espeak-ng, espeak, say); use --print")?;
        tracing::debug!("speech backend {backend:?}");

        let (tx, rx) = channel();
        Ok(Self {
            backend,
            current: None,
            tx,
            rx,
        })
    }

    fn command_for(&self, utterance: &Utterance) -> Command {
        let wpm = (BASE_WPM * utterance.rate).round().max(1.0) as u32;
        let (program, rate_flag) = match &self.backend {
            Backend::Espeak(path) => (path, "-s"),
            Backend::Say(path) => (path, "-r"),
        };
        let mut cmd = Command::new(program);
        cmd.arg(rate_flag).arg(wpm.to_string());
        if let Some(voice) = &utterance.voice {
            cmd.arg("-v").arg(&voice.name);
        }
        if matches!(self.backend, Backend::Espeak(_)) {
            cmd.arg("--");
        }
        cmd.arg(&utterance.text);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl SpeechEngine for CommandSpeech {
    fn voices(&self) -> Vec<Voice> {
        let listed = match &self.backend {
            Backend::Espeak(path) => Command::new(path)
                .arg("--voices")
                .output()
                .map(|output| parse_espeak_voices(&String::from_utf8_lossy(&output.stdout))),
            Backend::Say(path) => Command::new(path)
                .args(["-v", "?"])
                .output()
                .map(|output| parse_say_voices(&String::from_utf8_lossy(&output.stdout))),
        };
        listed.unwrap_or_else(|err| {
            tracing::warn!("listing voices failed: {err}");
            Vec::new()
        })
    }

    fn speak(&mut self, utterance: Utterance) -> anyhow::Result<()> {
        self.cancel();
        let child = self
            .command_for(&utterance)
            .spawn()
            .context("spawn speech synthesizer")?;
        let slot: ChildSlot = Arc::new(Mutex::new(Some(child)));
        self.current = Some(Arc::clone(&slot));

        let ticket = utterance.ticket;
        let tx = self.tx.clone();
        let _ = tx.send((ticket, SpeechEvent::Started));
        std::thread::spawn(move || watch_child(slot, ticket, tx));
        Ok(())
    }

    fn cancel(&mut self) {
        let Some(slot) = self.current.take() else {
            return;
        };
        let Ok(mut guard) = slot.lock() else {
            return;
        };
        if let Some(mut child) = guard.take() {
            if let Err(err) = child.kill() {
                tracing::debug!("kill synthesizer: {err}");
            }
            let _ = child.wait();
        }
    }
}

impl SpeechDriver for CommandSpeech {
    fn next_event(&mut self) -> anyhow::Result<(ChunkTicket, SpeechEvent)> {
        self.rx.recv().context("speech events closed")
    }
}

/// Reports the exit of the child in `slot`. A slot emptied by `cancel`
/// reports nothing.
fn watch_child(slot: ChildSlot, ticket: ChunkTicket, tx: Sender<(ChunkTicket, SpeechEvent)>) {
    loop {
        let status = {
            let Ok(mut guard) = slot.lock() else {
                return;
            };
            let Some(child) = guard.as_mut() else {
                return;
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    guard.take();
                    Ok(status)
                }
                Ok(None) => Err(None),
                Err(err) => {
                    guard.take();
                    Err(Some(err))
                }
            }
        };

        let event = match status {
            Ok(status) if status.success() => SpeechEvent::Ended,
            Ok(status) => SpeechEvent::Error(format!("synthesizer exited with {status}")),
            Err(Some(err)) => SpeechEvent::Error(err.to_string()),
            Err(None) => {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }
        };
        let _ = tx.send((ticket, event));
        return;
    }
}

/// `espeak --voices` prints `Pty Language Age/Gender VoiceName File Other`.
fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            match cols.as_slice() {
                [_, lang, _, name, ..] => Some(Voice::new(*name, *lang)),
                _ => None,
            }
        })
        .collect()
}

/// `say -v ?` prints `Name   en_GB    # sample sentence`.
fn parse_say_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim();
            let (name, lang) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            (!name.is_empty()).then(|| Voice::new(name, lang.replace('_', "-")))
        })
        .collect()
}

fn find_in_dirs(paths: &OsStr, name: &str) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_probably_executable(candidate))
}

fn is_probably_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o111 != 0)
    }

    #[cfg(not(unix))]
    {
        true
    }
}
