//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::cpu::execute::MachineState;
use crate::cpu::registers::Register;
use super::app::{DebuggerApp, OUTPUT_LINES};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, machine state and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(9),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: control queue, memory, output and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9),
            Constraint::Min(6),
            Constraint::Length(6),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_queue(frame, right_chunks[0], app);
    draw_memory(frame, right_chunks[1], app);
    draw_output(frame, right_chunks[2], app);
    draw_help(frame, right_chunks[3]);
}

/// Draw disassembly view.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:04}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw the register bank, last bus value and counters.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let m = &app.machine;
    let value = |r: Register| {
        let v = m.regs.get(r);
        let style = if r == Register::ProgramCounter {
            Style::default().fg(Color::Yellow)
        } else if v != 0 {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        vec![
            Span::raw(format!("{:>4}: ", r.name())),
            Span::styled(format!("{:>6}", v), style),
            Span::raw("   "),
        ]
    };
    let row = |regs: &[Register]| Line::from(regs.iter().flat_map(|&r| value(r)).collect::<Vec<_>>());

    let state_style = match m.state() {
        MachineState::Running => Style::default().fg(Color::Green),
        MachineState::Halted => Style::default().fg(Color::Yellow),
        MachineState::Faulted => Style::default().fg(Color::Red),
    };

    let content = vec![
        row(&[Register::ProgramCounter, Register::Instruction, Register::Address]),
        row(&[Register::A, Register::B, Register::Accumulator]),
        row(&[Register::IO, Register::AddressBackup, Register::Flags]),
        Line::from(vec![
            Span::raw(" BUS: "),
            Span::styled(format!("{:>6}", m.last_bus()), Style::default().fg(Color::Cyan)),
            Span::raw(format!("   ALU: {:?}", m.operation())),
        ]),
        Line::from(vec![
            Span::raw("Ticks: "),
            Span::styled(format!("{}", m.ticks()), Style::default().fg(Color::Cyan)),
            Span::raw(format!("   Instructions: {}", m.instructions())),
        ]),
        Line::from(vec![
            Span::raw("State: "),
            Span::styled(format!("{:?}", m.state()), state_style),
            Span::raw(format!("   Sequencer: {:?}", m.sequencer_state())),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Machine ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw the pending control words, next word first.
fn draw_queue(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible = (area.height as usize).saturating_sub(2);
    let items: Vec<ListItem> = app
        .machine
        .pending()
        .take(visible)
        .enumerate()
        .map(|(i, word)| {
            let style = if i == 0 {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            ListItem::new(format!("{}", word)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Control queue ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)));

    frame.render_widget(list, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let pc = app.pc();

    let items: Vec<ListItem> = app
        .machine
        .mem
        .dump(app.mem_scroll, visible_rows)
        .into_iter()
        .map(|(addr, value)| {
            let is_pc = addr as i16 == pc;
            let text = format!("{:04}: {:>6}  {:04x}", addr, value, value as u16);

            let style = if is_pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw what the display has printed.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = (area.height as usize).saturating_sub(2).min(OUTPUT_LINES);
    let lines: Vec<Line> = app.output.lines(rows).into_iter().map(Line::from).collect();

    let output = Paragraph::new(lines)
        .block(Block::default()
            .title(" Display ")
            .borders(Borders::ALL));

    frame.render_widget(output, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("t: Tick  s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
