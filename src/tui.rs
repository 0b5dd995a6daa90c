use crate::{
    lane_rate, DeviceId, DisplaySettings, Encoding, Health, Jesd, LaneHealth, LaneInfo, Snapshot,
    StatusHealth,
};
use anyhow::{anyhow, Result};
use crossbeam_channel::{select, tick, unbounded, Receiver};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use log::{debug, info};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    symbols::border,
    text::Line,
    widgets::{Block, Cell, Paragraph, Row, Table, Tabs, Widget},
    DefaultTerminal, Frame,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Latest poll outcome, shared between the poll worker and the UI.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    pub snapshot: Option<Snapshot>,
    pub error: Option<String>,
    pub polls: u64,
}

/// Terminal monitor: one tab per device, the link status table and the lane
/// table of the selected device.
pub struct Monitor {
    devices: Vec<DeviceId>,
    xcvr_count: usize,
    selected: usize,
    interval: Duration,
    display: DisplaySettings,
    view: PollState,
    exit: bool,
}

impl Monitor {
    pub fn new(
        devices: Vec<DeviceId>,
        xcvr_count: usize,
        interval: Duration,
        display: DisplaySettings,
    ) -> Self {
        Self {
            devices,
            xcvr_count,
            selected: 0,
            interval,
            display,
            view: PollState::default(),
            exit: false,
        }
    }

    /// Runs the UI until the user quits. `jesd` moves to the poll worker.
    pub fn run(&mut self, jesd: Jesd, terminal: &mut DefaultTerminal) -> Result<()> {
        let ticker = tick(Duration::from_millis(50));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Mutex::new(PollState::default()));
        let (tx_select, rx_select) = unbounded();

        let worker = self.spawn_worker(
            jesd,
            rx_select,
            Arc::clone(&shared),
            Arc::clone(&shutdown),
        );
        let mut selected = self.selected;

        while !self.exit {
            let _ = ticker.recv();

            self.handle_events()?;
            if self.selected != selected {
                selected = self.selected;
                if tx_select.send(selected).is_err() {
                    break;
                }
            }

            // copy out under the lock, render without it
            self.view = shared.lock().unwrap_or_else(PoisonError::into_inner).clone();

            terminal.draw(|f| self.draw(f))?;
        }

        shutdown.store(true, Ordering::SeqCst);
        drop(tx_select);
        worker.join().map_err(|_| anyhow!("poll worker panicked"))?;
        Ok(())
    }

    fn spawn_worker(
        &self,
        jesd: Jesd,
        rx_select: Receiver<usize>,
        shared: Arc<Mutex<PollState>>,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let devices = self.devices.clone();
        let interval = self.interval;
        let selected = self.selected;
        thread::spawn(move || {
            poll_worker(
                jesd, devices, selected, interval, rx_select, shared, shutdown,
            )
        })
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                    self.handle_key_event(key_event)
                }
                _ => {}
            };
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        let (prev, next) = if self.display.vim_keys {
            ('k', 'j')
        } else {
            ('a', 'd')
        };
        match key_event.code {
            KeyCode::Char('q') => self.exit = true,
            KeyCode::Char(c) if c == prev => self.select_prev(),
            KeyCode::Char(c) if c == next => self.select_next(),
            KeyCode::Left | KeyCode::Up => self.select_prev(),
            KeyCode::Right | KeyCode::Down => self.select_next(),
            KeyCode::F(n) => {
                let index = usize::from(n).saturating_sub(1);
                if n > 0 && index < self.devices.len() {
                    self.selected = index;
                }
            }
            _ => {}
        }
    }

    fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn select_next(&mut self) {
        if self.selected + 1 < self.devices.len() {
            self.selected += 1;
        }
    }

    fn block<'a>(&self, title: Line<'a>) -> Block<'a> {
        if self.display.simple {
            Block::new().title(title)
        } else {
            Block::bordered().title(title.centered()).border_set(border::THICK)
        }
    }

    fn render_tabs(&self, area: Rect, buf: &mut Buffer) {
        let titles = self
            .devices
            .iter()
            .enumerate()
            .map(|(i, dev)| Line::from(format!("F{} {}", i + 1, dev.short_name())));
        let title = Line::from(format!(
            " JESD204 devices ({} transceivers) ",
            self.xcvr_count
        ))
        .bold();
        Tabs::new(titles)
            .select(self.selected)
            .highlight_style(Style::new().black().on_cyan())
            .block(self.block(title))
            .render(area, buf);
    }

    fn render_status(&self, snapshot: &Snapshot, area: Rect, buf: &mut Buffer) {
        let rows = status_rows(snapshot)
            .into_iter()
            .map(|(label, value, health)| {
                Row::new(vec![
                    Cell::from(label),
                    Cell::from(value).style(health_style(health)),
                ])
            });
        let title = Line::from(format!(
            " {} ({}) ",
            snapshot.device.short_name(),
            snapshot.encoding
        ))
        .bold();
        Table::new(rows, [Constraint::Length(30), Constraint::Min(12)])
            .block(self.block(title))
            .render(area, buf);
    }

    fn render_lanes(&self, snapshot: &Snapshot, area: Rect, buf: &mut Buffer) {
        let header = Row::new(
            snapshot
                .encoding
                .lane_labels()
                .iter()
                .map(|l| Cell::from(*l)),
        )
        .style(Style::new().bold());

        let rows = snapshot
            .lanes
            .iter()
            .zip(&snapshot.lane_health)
            .enumerate()
            .map(|(i, (lane, health))| lane_row(i, lane, health, snapshot.encoding));

        let widths = vec![Constraint::Fill(1); snapshot.encoding.lane_labels().len()];
        let title = match snapshot.lanes.first() {
            Some(lane) => Line::from(ilas_summary(lane, snapshot.lanes.len())),
            None => Line::from(" no lanes "),
        };
        Table::new(rows, widths)
            .header(header)
            .block(self.block(title))
            .render(area, buf);
    }
}

impl Widget for &Monitor {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let instructions = if self.display.vim_keys {
            " Device <F1..F8> <K/J>  Quit <Q> "
        } else {
            " Device <F1..F8> <A/D>  Quit <Q> "
        };
        let [tabs, status, lanes, footer] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(16),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .areas(area);

        self.render_tabs(tabs, buf);

        let footer_text = match (&self.view.snapshot, &self.view.error) {
            (_, Some(error)) => Line::from(error.as_str()).red(),
            (Some(snapshot), None) => {
                let t = snapshot.taken_at.time();
                Line::from(format!(
                    "{instructions} last poll {:02}:{:02}:{:02} UTC, {} polls",
                    t.hour(),
                    t.minute(),
                    t.second(),
                    self.view.polls
                ))
            }
            (None, None) => Line::from(format!("{instructions} waiting for first poll")),
        };
        Paragraph::new(footer_text).render(footer, buf);

        if let Some(snapshot) = &self.view.snapshot {
            self.render_status(snapshot, status, buf);
            self.render_lanes(snapshot, lanes, buf);
        }
    }
}

fn poll_worker(
    jesd: Jesd,
    devices: Vec<DeviceId>,
    mut selected: usize,
    interval: Duration,
    rx_select: Receiver<usize>,
    shared: Arc<Mutex<PollState>>,
    shutdown: Arc<AtomicBool>,
) {
    let ticker = tick(interval);
    let mut polls = 0;
    info!("poll worker started, {} devices every {interval:?}", devices.len());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let Some(device) = devices.get(selected) else {
            break;
        };

        let result = jesd.poll(device);
        polls += 1;
        {
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            state.polls = polls;
            match result {
                Ok(snapshot) => {
                    state.snapshot = Some(snapshot);
                    state.error = None;
                }
                Err(e) => {
                    debug!("{device}: {e}");
                    state.error = Some(if e.is_permission_denied() {
                        format!("{device}: {e} (run as root?)")
                    } else {
                        format!("{device}: {e}")
                    });
                }
            }
        }

        select! {
            recv(rx_select) -> msg => match msg {
                Ok(index) => {
                    selected = index;
                    polls = 0;
                    *shared.lock().unwrap_or_else(PoisonError::into_inner) = PollState::default();
                }
                Err(_) => break,
            },
            recv(ticker) -> _ => {}
        }
    }
    info!("poll worker stopped");
}

fn health_style(health: Health) -> Style {
    match health {
        Health::Good => Style::new().fg(Color::Green),
        Health::Marginal => Style::new().fg(Color::Yellow),
        Health::Error => Style::new().fg(Color::Red),
        Health::NotApplicable => Style::new(),
    }
}

/// Status table rows in the order of [`Encoding::status_labels`].
fn status_rows(snapshot: &Snapshot) -> Vec<(&'static str, String, Health)> {
    let s = &snapshot.status;
    let h: &StatusHealth = &snapshot.status_health;
    let na = Health::NotApplicable;

    let mut values = vec![
        (s.link_state.to_string(), h.link_state),
        (s.link_status.to_string(), h.link_status),
        (s.measured_link_clock.to_string(), h.measured_link_clock),
        (s.reported_link_clock.to_string(), h.lane_rate_div),
        (s.measured_device_clock.to_string(), h.measured_device_clock),
        (s.reported_device_clock.to_string(), h.reported_device_clock),
        (s.desired_device_clock.to_string(), na),
        (s.lane_rate.to_string(), na),
        (s.lane_rate_div.to_string(), na),
        (s.lmfc_rate.to_string(), na),
        (s.sysref_captured.to_string(), h.sysref_captured),
        (s.sysref_alignment_error.to_string(), h.sysref_alignment_error),
    ];
    if snapshot.encoding == Encoding::B8b10b {
        values.push((s.sync_state.to_string(), h.sync_state));
    }

    let mut rows: Vec<_> = snapshot
        .encoding
        .status_labels()
        .iter()
        .zip(values)
        .map(|(label, (value, health))| (*label, value, health))
        .collect();
    if !s.is_trained() {
        rows.push(("External reset", s.external_reset.to_string(), na));
    }
    rows
}

fn lane_row<'a>(index: usize, lane: &LaneInfo, health: &LaneHealth, encoding: Encoding) -> Row<'a> {
    let cell = |text: String, health: Health| Cell::from(text).style(health_style(health));
    let mut cells = vec![
        Cell::from(index.to_string()),
        cell(lane.lane_errors.to_string(), health.errors),
    ];
    match encoding {
        Encoding::B8b10b => {
            cells.push(cell(
                format!(
                    "{}/{}",
                    lane.lane_latency_multiframes, lane.lane_latency_octets
                ),
                health.latency,
            ));
            cells.push(cell(lane.cgs_state.to_string(), health.cgs_state));
            cells.push(cell(lane.init_frame_sync.to_string(), health.init_frame_sync));
            cells.push(cell(
                lane.init_lane_align_seq.to_string(),
                health.init_lane_align_seq,
            ));
        }
        Encoding::B64b66b => {
            let latency = if lane.lane_latency_min == 0 && lane.lane_latency_max == 0 {
                lane.lane_latency_octets.to_string()
            } else {
                format!(
                    "{} ({}..{})",
                    lane.lane_latency_octets, lane.lane_latency_min, lane.lane_latency_max
                )
            };
            cells.push(cell(latency, health.latency));
            cells.push(cell(
                lane.ext_multiblock_align_state.to_string(),
                health.ext_multiblock_align,
            ));
        }
    }
    Row::new(cells)
}

/// One-line ILAS configuration of the link, taken from its first lane.
fn ilas_summary(lane: &LaneInfo, lanes: usize) -> String {
    let rate = lane_rate(lane);
    let mut summary = format!(
        " {lanes} lanes  L={} M={} F={} K={} S={} N={} N'={} CS={} HD={} SCR={} JESDV={} SUBCLASS={}",
        lane.l,
        lane.m,
        lane.f,
        lane.k,
        lane.s,
        lane.n,
        lane.nd,
        lane.cs,
        lane.hd,
        lane.scr,
        lane.jesdv,
        lane.subclassv
    );
    if rate > 0 {
        summary.push_str(&format!("  {:.3} Gbps", rate as f64 / 1e9));
    }
    summary.push(' ');
    summary
}
