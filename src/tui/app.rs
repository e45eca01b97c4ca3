//! Debugger application state and logic.

use crate::asm::disasm::disassemble_instruction;
use crate::asm::image::{Image, InstructionWord, BODY_START, WORD_UNITS};
use crate::cpu::execute::{Machine, SequencerState};
use crate::cpu::registers::Register;
use crate::io::Display;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::Write;
use std::rc::Rc;

/// Most lines the output pane shows.
pub(super) const OUTPUT_LINES: usize = 64;

/// Captures what the display prints while the terminal is in raw mode.
#[derive(Clone, Default)]
pub struct OutputLog(Rc<RefCell<Vec<u8>>>);

impl OutputLog {
    /// The last `n` printed lines.
    pub fn lines(&self, n: usize) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.0.borrow()).into_owned();
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        lines[lines.len().saturating_sub(n)..].to_vec()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for OutputLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Original image, reloaded on reset.
    pub image: Image,
    pub memory_size: usize,
    /// Breakpoints (by address unit of an instruction).
    pub breakpoints: HashSet<i16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in cells.
    pub mem_scroll: usize,
    /// What the display peripheral printed.
    pub output: OutputLog,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded image.
    pub fn new(image: Image, memory_size: usize) -> Self {
        let output = OutputLog::default();
        let machine = Self::boot(&image, memory_size, &output);

        Self {
            machine,
            image,
            memory_size,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 't' to tick, 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
            output,
        }
    }

    fn boot(image: &Image, memory_size: usize, output: &OutputLog) -> Machine {
        let mut machine = Machine::with_image(image, memory_size);
        let out = output.clone();
        machine.attach(move |port| Display::with_writer(port, out));
        machine
    }

    /// Advance one clock tick.
    pub fn tick_once(&mut self) {
        if !self.machine.is_running() {
            self.status = format!("Machine stopped: {:?}", self.machine.state());
            self.running = false;
            return;
        }

        match self.machine.tick() {
            Ok(tick) => {
                self.status = match tick.decoded {
                    Some(op) => format!("T{}: {}  decoded {:?}", self.machine.ticks(), tick.word, op),
                    None => format!("T{}: {}  bus={}", self.machine.ticks(), tick.word, tick.bus),
                };
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run to the end of the current instruction.
    pub fn step(&mut self) {
        if !self.machine.is_running() {
            self.status = format!("Machine stopped: {:?}", self.machine.state());
            self.running = false;
            return;
        }

        let pc = self.pc();
        match self.machine.step() {
            Ok(Some(op)) => self.status = format!("{:04}: {:?}", pc, op),
            Ok(None) => self.status = "Finished the instruction in progress.".into(),
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.machine.is_running() {
            self.running = false;
            self.status = format!("Stopped after {} ticks", self.machine.ticks());
            return;
        }

        self.step();

        // Check for breakpoint before the next fetch
        let pc = self.pc();
        if self.running && self.at_instruction_boundary() && self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={}", pc);
        }
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.pc();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={}", pc);
        }
    }

    /// Reload the image into a fresh machine.
    pub fn reset(&mut self) {
        self.output.clear();
        self.machine = Self::boot(&self.image, self.memory_size, &self.output);
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    pub fn pc(&self) -> i16 {
        self.machine.regs.get(Register::ProgramCounter)
    }

    fn at_instruction_boundary(&self) -> bool {
        self.machine.sequencer_state() == SequencerState::Idle
    }

    /// Disassembly of the instruction words around the PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(i16, String, bool)> {
        let pc = self.pc();
        let half = (lines / 2) as i16 * WORD_UNITS as i16;
        // Keep rows on the word grid of the image body.
        let aligned = pc - (pc - BODY_START as i16).rem_euclid(WORD_UNITS as i16);
        let start = (aligned - half).max(BODY_START as i16);

        (0..lines as i16)
            .filter_map(|i| {
                let addr = start.checked_add(i * WORD_UNITS as i16)?;
                let opcode = self.machine.mem.read(addr).ok()?;
                let operand = self.machine.mem.read(addr.checked_add(1)?).ok()?;
                let word = InstructionWord { opcode, operand: operand as u16 };
                Some((addr, disassemble_instruction(word), addr == pc))
            })
            .collect()
    }
}

/// Run the debugger on an image.
pub fn run_debugger(image: Image, memory_size: usize) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(image, memory_size);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(30))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('t') => {
                            app.running = false;
                            app.tick_once();
                        }
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => {
                            app.mem_scroll = app.mem_scroll.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.machine.mem.len() {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
