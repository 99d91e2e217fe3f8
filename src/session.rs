//! Session management
//!
//! A [`Session`] ties one child process, its pseudo-terminal, the VT
//! parser, and the terminal state together. The host drives it from its
//! own event loop: call [`Session::update`] on a tick to drain child
//! output and answer queries, [`Session::draw`] to push changes to the
//! attached sink, and [`Session::write`]/[`Session::paste`] to deliver
//! input. Everything runs on the caller's thread.

use thiserror::Error;

use crate::config::TermConfig;
use crate::display::DisplaySink;
use crate::process::{HostProcessFactory, Process, ProcessFactory, SpawnError};
use crate::pty::{PseudoTerminal, PtyError};
use crate::term::{TerminalState, VtParser};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Pty(#[from] PtyError),
}

const READ_CHUNK: usize = 4096;

/// A live terminal session.
pub struct Session {
    /// Terminal state; exposed so hosts can query geometry, selection,
    /// and modes directly.
    pub state: TerminalState,
    parser: VtParser,
    pty: PseudoTerminal,
    process: Process,
    paste_crlf: bool,
    responses: Vec<crate::term::Response>,
}

impl Session {
    /// Spawn the configured program on the host.
    pub fn spawn(config: &TermConfig) -> Result<Self, SessionError> {
        Self::spawn_with(&HostProcessFactory, config)
    }

    /// Spawn through an explicit factory.
    pub fn spawn_with(
        factory: &dyn ProcessFactory,
        config: &TermConfig,
    ) -> Result<Self, SessionError> {
        let (process, pty) = factory.create_with_pseudo_terminal(
            &config.program,
            &config.args,
            &config.working_directory,
            config.columns,
            config.rows,
        )?;
        tracing::info!(
            "session started: {} ({}x{})",
            config.program,
            config.columns,
            config.rows
        );
        let mut state = TerminalState::new(config.columns, config.rows);
        state.modes.allow_alt_screen = config.allow_alt_screen;
        Ok(Self {
            state,
            parser: VtParser::new(),
            pty,
            process,
            paste_crlf: config.paste_crlf,
            responses: Vec::new(),
        })
    }

    /// One tick: drain all pending child output through the parser, send
    /// back any owed responses, and poll the exit status. Returns whether
    /// any output was consumed.
    pub fn update(&mut self) -> Result<bool, SessionError> {
        let mut buffer = [0u8; READ_CHUNK];
        let mut changed = false;
        loop {
            match self.pty.read(&mut buffer, false) {
                Ok(0) => break,
                Ok(n) => {
                    self.parser
                        .advance(&mut self.state, &buffer[..n], &mut self.responses);
                    changed = true;
                }
                Err(PtyError::Eof) => {
                    tracing::debug!("pty peer closed");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.process.check_exit_status();
        if self.process.has_exited() {
            self.responses.clear();
        } else {
            for response in std::mem::take(&mut self.responses) {
                self.pty.write(&response.to_bytes())?;
            }
            if let Some(report) = self.state.take_focus_report() {
                self.pty.write(report)?;
            }
        }
        Ok(changed)
    }

    /// Push accumulated screen changes through the attached sink.
    pub fn draw(&mut self) {
        self.state.draw();
    }

    pub fn attach_sink(&mut self, sink: Box<dyn DisplaySink>) {
        self.state.attach_sink(sink);
    }

    pub fn detach_sink(&mut self) -> Box<dyn DisplaySink> {
        self.state.detach_sink()
    }

    /// Raw input bytes for the child, unmodified.
    pub fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.pty.write(data)?;
        Ok(())
    }

    /// Paste text: line endings are normalized to CR (or CRLF when
    /// configured), and the whole paste is wrapped in bracketed-paste
    /// markers when the child asked for them.
    pub fn paste(&mut self, text: &str) -> Result<(), SessionError> {
        let newline: &str = if self.paste_crlf { "\r\n" } else { "\r" };
        let mut normalized = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    normalized.push_str(newline);
                }
                '\n' => normalized.push_str(newline),
                _ => normalized.push(ch),
            }
        }
        if self.state.modes.bracketed_paste {
            self.pty.write(b"\x1b[200~")?;
            self.pty.write(normalized.as_bytes())?;
            self.pty.write(b"\x1b[201~")?;
        } else {
            self.pty.write(normalized.as_bytes())?;
        }
        Ok(())
    }

    /// Resize the emulation state first, then the kernel-side pty, so the
    /// child's SIGWINCH view never races ahead of ours.
    pub fn resize(&mut self, columns: u16, rows: u16) -> Result<(), SessionError> {
        self.state.resize(columns, rows);
        self.pty.resize(columns, rows)?;
        Ok(())
    }

    pub fn set_focus(&mut self, focused: bool) {
        self.state.set_focus(focused);
    }

    pub fn is_alive(&self) -> bool {
        !self.process.has_exited()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.process.exit_code()
    }

    /// Forcibly end the child. Safe to call more than once.
    pub fn terminate(&mut self) {
        self.process.terminate();
    }

    /// Block until the child exits, then drain whatever output is left.
    pub fn wait_for_exit(&mut self) -> Result<(), SessionError> {
        self.process.wait_for_exit();
        self.update()?;
        Ok(())
    }

    /// Let the child keep running after this session is dropped.
    pub fn leave_running(&mut self) {
        self.process.leave_running();
    }

    pub fn title(&self) -> &str {
        self.state.title()
    }
}
