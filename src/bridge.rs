// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The bridge mainline.
//!
//! Owns every collaborator and turns the crank: drains MIDI input into the
//! tempo and trigger paths, drains pad hits out to MIDI, scans the keyboard
//! into the command console, and executes completed console commands. One
//! [`Bridge::step`] is one iteration; [`Bridge::run`] loops it forever.

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use midly::live::{LiveEvent, SystemRealtime};
use tracing::{info, warn};

use crate::bus::Arbiter;
use crate::hostmap::{InputJacks, LedSet2, LINK_DISPLAY};
use crate::keys::KeyScanner;
use crate::lui::{Command, LocalUi};
use crate::midi::{sysex, Device, Port, Router};
use crate::settings::{self, Settings};
use crate::storage::BankStorage;
use crate::tempo::{ClockSource, TempoSync, Transport};
use crate::trigger::{PadPort, TriggerEvent, TriggerPipeline};
use crate::voices::{BankRef, Loader, SampleBuffer, SizeClass, Voice};

/// How long the host reset line is held during a commanded reboot.
const HOST_RESET_PULSE: Duration = Duration::from_millis(100);

/// Mainline idle time per iteration.
const STEP_INTERVAL: Duration = Duration::from_micros(500);

pub struct Bridge {
    arbiter: Arbiter,
    trigger: TriggerPipeline,
    trigger_events: Receiver<TriggerEvent>,
    scanner: KeyScanner,
    ui: LocalUi,
    tempo: TempoSync,
    loader: Loader,
    router: Router,
    settings: Settings,
    storage: BankStorage,
    din5_rx: Option<Receiver<Vec<u8>>>,
    usb_rx: Option<Receiver<Vec<u8>>>,
    reset_until: Option<Instant>,
    last_entry_shown: Option<u8>,
    saved_link: Option<u8>,
    last_transport: Transport,
    clock_loss_pause: bool,
}

impl Bridge {
    pub fn new(
        arbiter: Arbiter,
        pad: Box<dyn PadPort>,
        din5: Option<Arc<dyn Device>>,
        usb: Option<Arc<dyn Device>>,
        settings: Settings,
        storage: BankStorage,
    ) -> Bridge {
        let trigger = TriggerPipeline::new(pad, arbiter.trigger_gate());
        let trigger_events = trigger.events();

        let mut router = Router::new(din5.clone(), usb.clone());
        router.set_routes(settings.routes());
        router.set_channel(settings.midi_channel());

        let mut tempo = TempoSync::new();
        tempo.set_honor_start_stop(settings.honor_start_stop());

        let din5_rx = din5.and_then(|device| watch(device.as_ref()));
        let usb_rx = usb.and_then(|device| watch(device.as_ref()));

        Bridge {
            arbiter,
            trigger,
            trigger_events,
            scanner: KeyScanner::new(),
            ui: LocalUi::new(),
            tempo,
            loader: Loader::new(),
            router,
            settings,
            storage,
            din5_rx,
            usb_rx,
            reset_until: None,
            last_entry_shown: None,
            saved_link: None,
            last_transport: Transport::Stopped,
            clock_loss_pause: false,
        }
    }

    /// Shows the firmware version on the displays at power-up, unless the
    /// boot screen has been disabled.
    pub fn boot(&mut self) {
        if !self.settings.boot_screen() {
            return;
        }
        let mut parts = env!("CARGO_PKG_VERSION").split('.');
        let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        match self.arbiter.transaction() {
            Ok(mut txn) => {
                txn.show_pattern(major);
                txn.show_link(minor);
            }
            Err(e) => warn!(err = %e, "Unable to show boot screen."),
        }
    }

    /// Runs the mainline forever.
    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        info!("Bridge running.");
        loop {
            self.step(Instant::now());
            spin_sleep::sleep(STEP_INTERVAL);
        }
    }

    /// One mainline iteration.
    pub fn step(&mut self, now: Instant) {
        if self.check_reset(now) {
            return;
        }

        self.trigger.service_interrupt();
        self.drain_midi();
        self.drain_trigger_events();

        self.tempo.poll(now);
        self.announce_transport();
        if self.tempo.take_pending_clock() {
            self.router.send_clock();
        }

        self.scan_keys(now);
    }

    /// Handles a decoded tape FSK clock edge from the sync input.
    pub fn on_fsk_edge(&mut self, now: Instant) {
        self.tempo.on_fsk_edge(now);
    }

    /// Handles a tick of the host's internal tempo oscillator.
    pub fn on_internal_tick(&mut self, now: Instant) {
        self.tempo.on_internal_tick(now);
    }

    pub fn tempo(&self) -> &TempoSync {
        &self.tempo
    }

    pub fn arbiter_mut(&mut self) -> &mut Arbiter {
        &mut self.arbiter
    }

    /// Stages a numbered bank from storage and commits it into the drum
    /// machine's SRAM.
    pub fn load_voice_bank(&mut self, bank: u8) -> Result<(), Box<dyn Error>> {
        self.loader.stage_bank(&self.storage, BankRef::Bank(bank));
        self.loader
            .commit_bank(&mut self.arbiter, &self.storage, bank)?;
        // A full bank is several hundred milliseconds of bus hold; the gap
        // must not read as a lost tempo clock.
        self.tempo.reset_clock_check(Instant::now());
        Ok(())
    }

    /// Announces transport transitions on the clock-out route. Transitions
    /// the far end itself commanded over MIDI are not echoed back.
    fn announce_transport(&mut self) {
        let transport = self.tempo.transport();
        if transport == self.last_transport {
            return;
        }
        if self.tempo.source() != ClockSource::Midi {
            match transport {
                Transport::Running if self.clock_loss_pause => self.router.send_continue(),
                Transport::Running => self.router.send_start(),
                Transport::Stopped => {
                    self.router.send_stop();
                    if self.tempo.no_clock() && self.tempo.source() == ClockSource::TapeFsk {
                        self.report_tape_loss();
                    }
                }
            }
        }
        self.clock_loss_pause = transport == Transport::Stopped && self.tempo.no_clock();
        self.last_transport = transport;
    }

    /// On tape clock loss, checks whether the sync jack is still inserted so
    /// the log can tell a dropout from an unplugged cable.
    fn report_tape_loss(&mut self) {
        if let Ok(mut txn) = self.arbiter.transaction() {
            if txn.input_jacks().contains(InputJacks::TAPE_FSK) {
                warn!("Tape clock lost with the sync jack still connected.");
            } else {
                warn!("Tape clock lost, sync jack disconnected.");
            }
        }
    }

    /// While a commanded reboot is in flight, the host reset line stays
    /// asserted and everything else is locked out.
    fn check_reset(&mut self, now: Instant) -> bool {
        match self.reset_until {
            Some(deadline) if now >= deadline => {
                info!("Releasing host reset.");
                self.arbiter.set_host_reset(false);
                self.reset_until = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn drain_midi(&mut self) {
        for port in Port::ALL {
            let rx = match port {
                Port::Din5 => &self.din5_rx,
                Port::Usb => &self.usb_rx,
            };
            let Some(rx) = rx else {
                continue;
            };

            // Collect first; handling an event needs &mut self.
            let mut raw_events = Vec::new();
            while let Ok(raw) = rx.try_recv() {
                raw_events.push(raw);
            }
            for raw in raw_events {
                self.handle_midi(port, &raw);
            }
        }
    }

    fn handle_midi(&mut self, port: Port, raw: &[u8]) {
        self.router.soft_thru(raw);

        let event = match LiveEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(err = %e, "Unparseable MIDI event.");
                return;
            }
        };

        match event {
            LiveEvent::Realtime(realtime) => {
                if !self.router.accepts_clock(port) {
                    return;
                }
                let now = Instant::now();
                match realtime {
                    SystemRealtime::TimingClock => self.tempo.on_midi_clock(now),
                    SystemRealtime::Start => self.tempo.on_midi_start(now),
                    SystemRealtime::Continue => self.tempo.on_midi_continue(now),
                    SystemRealtime::Stop => self.tempo.on_midi_stop(),
                    _ => {}
                }
            }
            LiveEvent::Midi { channel, message } => {
                if !self.router.accepts_notes(port) {
                    return;
                }
                if channel.as_int() != self.router.channel() - 1 {
                    return;
                }
                match message {
                    midly::MidiMessage::NoteOn { key, vel } => {
                        self.trigger
                            .play_note(&mut self.arbiter, key.as_int(), vel.as_int());
                    }
                    midly::MidiMessage::ProgramChange { program }
                        if program.as_int() <= 99 =>
                    {
                        if let Err(e) = self.load_voice_bank(program.as_int()) {
                            warn!(err = %e, "Program change bank load failed.");
                        }
                    }
                    _ => {}
                }
            }
            LiveEvent::Common(midly::live::SystemCommon::SysEx(body)) => {
                if !self.router.accepts_sysex(port) {
                    return;
                }
                let body: Vec<u8> = body.iter().map(|byte| byte.as_int()).collect();
                self.handle_sysex(&body);
            }
            _ => {}
        }
    }

    fn drain_trigger_events(&mut self) {
        while let Ok(event) = self.trigger_events.try_recv() {
            match event {
                TriggerEvent::NoteOn { note, velocity } => {
                    self.router.send_note_on(note, velocity)
                }
                TriggerEvent::NoteOff { note } => self.router.send_note_off(note),
            }
        }
    }

    fn scan_keys(&mut self, now: Instant) {
        let events = match self.scanner.scan(&mut self.arbiter) {
            Ok(events) => events,
            Err(e) => {
                warn!(err = %e, "Key scan failed.");
                return;
            }
        };
        for event in events {
            self.ui.on_key(event);
        }

        self.echo_entry();

        if let Some(command) = self.ui.take_command() {
            if let Err(e) = self.execute(command, now) {
                warn!(command = ?command, err = %e, "Console command failed.");
            }
            // Commands can hold the bus past the clock-loss window.
            self.tempo.reset_clock_check(Instant::now());
        }
    }

    /// Echoes the console's digit entry on the link display and lights the
    /// STORE LED while it is active. The display is put back the way the
    /// host had it when the console closes.
    fn echo_entry(&mut self) {
        let entry = self.ui.is_active().then(|| self.ui.entry());
        if entry == self.last_entry_shown {
            return;
        }
        if let Ok(mut txn) = self.arbiter.transaction() {
            match entry {
                Some(value) => {
                    if self.saved_link.is_none() {
                        self.saved_link = Some(txn.read(LINK_DISPLAY));
                    }
                    txn.show_link(value);
                    txn.set_led_set_2(LedSet2::LED_STORE);
                }
                None => {
                    if let Some(saved) = self.saved_link.take() {
                        txn.write(LINK_DISPLAY, saved);
                    }
                    txn.clear_led_set_2(LedSet2::LED_STORE);
                }
            }
            self.last_entry_shown = entry;
        }
    }

    fn execute(&mut self, command: Command, now: Instant) -> Result<(), Box<dyn Error>> {
        info!(?command, "Executing console command.");
        match command {
            Command::LoadVoiceBank(bank) => {
                self.load_voice_bank(bank)?;
                self.router.send_program_change(bank);
            }
            Command::StoreVoiceBank(bank) => {
                self.loader
                    .commit_bank(&mut self.arbiter, &self.storage, bank)?;
            }
            Command::SaveRamBank(bank) => {
                let image = self.arbiter.transaction()?.dump_ram();
                self.storage.save_ram_image(BankRef::Bank(bank), &image)?;
            }
            Command::LoadRamBank(bank) => {
                match self.storage.load_ram_image(BankRef::Bank(bank)) {
                    Some(image) => self.arbiter.transaction()?.load_ram(&image),
                    None => return Err(format!("no RAM image in bank {}", bank).into()),
                }
            }
            Command::CopyVoice { src, dst } => {
                self.loader.copy(&mut self.arbiter, src, dst)?;
            }
            Command::ReverseVoice(voice) => {
                self.loader.reverse(&mut self.arbiter, voice)?;
            }
            Command::SetMidiChannel(channel) => {
                self.settings.set(settings::KEY_MIDI_CHANNEL, channel)?;
                self.router.set_channel(channel);
            }
            Command::SetNoteOutRoute(route) => {
                self.settings
                    .set(settings::KEY_NOTE_OUT_ROUTE, route.encoding())?;
                self.router.set_routes(self.settings.routes());
            }
            Command::SetNoteInRoute(route) => {
                self.settings
                    .set(settings::KEY_NOTE_IN_ROUTE, route.encoding())?;
                self.router.set_routes(self.settings.routes());
            }
            Command::SetClockOutRoute(route) => {
                self.settings
                    .set(settings::KEY_CLOCK_OUT_ROUTE, route.encoding())?;
                self.router.set_routes(self.settings.routes());
            }
            Command::SetClockInRoute(route) => {
                self.settings
                    .set(settings::KEY_CLOCK_IN_ROUTE, route.encoding())?;
                self.router.set_routes(self.settings.routes());
            }
            Command::SetSysexRoute(route) => {
                self.settings
                    .set(settings::KEY_SYSEX_ROUTE, route.encoding())?;
                self.router.set_routes(self.settings.routes());
            }
            Command::SetFanMode(on) => {
                self.settings
                    .set(settings::KEY_FAN_MODE, u8::from(on))?;
            }
            Command::SetBootScreen(on) => {
                self.settings
                    .set(settings::KEY_BOOT_SCREEN, u8::from(on))?;
            }
            Command::RebootHost => {
                info!("Rebooting host.");
                self.arbiter.set_host_reset(true);
                self.reset_until = Some(now + HOST_RESET_PULSE);
            }
        }
        Ok(())
    }

    fn handle_sysex(&mut self, body: &[u8]) {
        let message = match sysex::Message::decode(body) {
            Ok(message) => message,
            // Someone else's sysex is not our problem.
            Err(sysex::SysexError::NotOurs) => return,
            Err(e) => {
                warn!(err = %e, "Bad sysex message.");
                return;
            }
        };

        if let Err(e) = self.dispatch_sysex(message) {
            warn!(err = %e, "Sysex handling failed.");
        }
        // Sample and RAM transfers can hold the bus past the clock-loss
        // window.
        self.tempo.reset_clock_check(Instant::now());
    }

    fn dispatch_sysex(&mut self, message: sysex::Message) -> Result<(), Box<dyn Error>> {
        match message {
            sysex::Message::SampleDump {
                bank,
                voice,
                name,
                data,
            } => self.receive_sample(bank, voice, &name, data)?,
            sysex::Message::RamImage { bank, data } => match bank {
                BankRef::Active => self.arbiter.transaction()?.load_ram(&data),
                bank => {
                    self.storage.save_ram_image(bank, &data)?;
                }
            },
            sysex::Message::SampleRequest { bank, voice } => {
                let sample =
                    self.loader
                        .get_voice(&mut self.arbiter, &self.storage, bank, voice)?;
                let reply = sysex::Message::SampleDump {
                    bank,
                    voice,
                    name: sample.name.clone(),
                    data: sample.data,
                };
                self.router.send_sysex(&reply.encode())?;
            }
            sysex::Message::RamRequest { bank } => {
                let data = match bank {
                    BankRef::Active => self.arbiter.transaction()?.dump_ram(),
                    bank => self
                        .storage
                        .load_ram_image(bank)
                        .ok_or("no RAM image stored for bank")?,
                };
                let reply = sysex::Message::RamImage { bank, data };
                self.router.send_sysex(&reply.encode())?;
            }
        }
        Ok(())
    }

    fn receive_sample(
        &mut self,
        bank: BankRef,
        voice: Voice,
        name: &str,
        data: Vec<u8>,
    ) -> Result<(), Box<dyn Error>> {
        match bank {
            BankRef::Active => {
                let sample = SampleBuffer::new(name, BankRef::Active, data)?;
                if let Some(class) = SizeClass::fitting(sample.data.len()) {
                    self.loader.set_size_class(voice, class);
                }
                self.loader.load_sample(&mut self.arbiter, voice, &sample)?;
                self.loader.stage_sample(voice, sample);
            }
            bank => {
                self.storage.replace_sample(bank, voice, name, &data)?;
            }
        }
        Ok(())
    }
}

fn watch(device: &dyn Device) -> Option<Receiver<Vec<u8>>> {
    let (tx, rx) = unbounded();
    match device.watch_events(tx) {
        Ok(()) => Some(rx),
        Err(e) => {
            warn!(device = device.name(), err = %e, "Unable to watch MIDI events.");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::bus::test::{pair, HostHandle};
    use crate::keys::{KEY_PLAY_STOP, KEY_STORE};
    use crate::midi::test::Device as MockMidi;
    use crate::trigger::MockPadPort;

    use super::*;

    struct Rig {
        bridge: Bridge,
        host: HostHandle,
        pad: MockPadPort,
        usb: Arc<MockMidi>,
        dir: tempfile::TempDir,
    }

    fn setup() -> Rig {
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let (pins, host) = pair();
        let arbiter = Arbiter::new(Box::new(pins), Duration::from_millis(50));
        let pad = MockPadPort::default();
        let usb = Arc::new(MockMidi::get("mock-usb"));
        let settings = Settings::open(dir.path().join("settings.bin"));
        let storage = BankStorage::new(dir.path().join("banks"));

        let bridge = Bridge::new(
            arbiter,
            Box::new(pad.clone()),
            None,
            Some(usb.clone() as Arc<dyn Device>),
            settings,
            storage,
        );
        Rig {
            bridge,
            host,
            pad,
            usb,
            dir,
        }
    }

    fn framed(message: &sysex::Message) -> Vec<u8> {
        let mut bytes = vec![0xf0];
        bytes.extend(message.encode());
        bytes.push(0xf7);
        bytes
    }

    /// Walks a key through enough scans to clear the debouncer.
    fn press_key(rig: &mut Rig, code: u8) {
        let row = (code / 8) as usize;
        let bit = 1 << (code % 8);
        rig.host.set_key_row(row, bit);
        for _ in 0..4 {
            rig.bridge.step(Instant::now());
        }
        rig.host.set_key_row(row, 0);
        for _ in 0..4 {
            rig.bridge.step(Instant::now());
        }
    }

    #[test]
    fn test_inbound_note_strobes_the_drum() {
        let mut rig = setup();

        // Note on, channel 1, bass note.
        rig.usb.mock_event(&[0x90, 36, 127]);
        rig.bridge.step(Instant::now());
        assert_eq!(1, rig.host.strobe_count(Voice::Bass.index()));

        // Wrong channel is ignored.
        rig.usb.mock_event(&[0x91, 36, 127]);
        rig.bridge.step(Instant::now());
        assert_eq!(1, rig.host.strobe_count(Voice::Bass.index()));
    }

    #[test]
    fn test_pad_hit_emits_note_on_and_off() {
        let mut rig = setup();

        rig.pad.set_status(1 << Voice::Snare.index());
        rig.bridge.step(Instant::now());
        rig.pad.set_status(0);

        let emitted = rig.usb.emitted_events();
        assert_eq!(vec![0x90, 37, 127], emitted[0]);
        assert_eq!(vec![0x80, 37, 0], emitted[1]);
    }

    #[test]
    fn test_fsk_edge_echoes_midi_clock() {
        let mut rig = setup();
        let now = Instant::now();

        rig.bridge.on_fsk_edge(now);
        rig.bridge.step(now);
        assert!(rig
            .usb
            .emitted_events()
            .contains(&vec![0xf8]));
        assert!(rig.bridge.tempo().is_running());
    }

    #[test]
    fn test_bank_load_does_not_stop_tape_transport() {
        let mut rig = setup();

        let storage = BankStorage::new(rig.dir.path().join("banks"));
        for voice in Voice::ALL {
            storage
                .replace_sample(BankRef::Bank(3), voice, voice.dir_name(), &[0x11u8; 32768])
                .expect("replace failed");
        }

        rig.bridge.on_fsk_edge(Instant::now());
        // Ten 32K voices is well over half a second of bus hold.
        rig.bridge.load_voice_bank(3).expect("load failed");

        rig.bridge.step(Instant::now());
        assert!(rig.bridge.tempo().is_running());
        assert!(!rig.bridge.tempo().no_clock());
    }

    #[test]
    fn test_transport_transitions_are_announced() {
        let mut rig = setup();
        let t0 = Instant::now();

        rig.bridge.on_fsk_edge(t0);
        rig.bridge.step(t0);
        assert!(rig.usb.emitted_events().contains(&vec![0xfa]));

        // Clock loss stops the transport and says so.
        rig.bridge.step(t0 + Duration::from_millis(600));
        assert!(rig.usb.emitted_events().contains(&vec![0xfc]));

        // The tape coming back mid-song is a continue, not a restart.
        rig.bridge.on_fsk_edge(t0 + Duration::from_millis(700));
        rig.bridge.step(t0 + Duration::from_millis(700));
        assert!(rig.usb.emitted_events().contains(&vec![0xfb]));
    }

    #[test]
    fn test_midi_transport_is_not_echoed_back() {
        let mut rig = setup();

        rig.usb.mock_event(&[0xfa]);
        rig.bridge.step(Instant::now());

        assert!(rig.bridge.tempo().is_running());
        assert!(!rig.usb.emitted_events().contains(&vec![0xfa]));
    }

    #[test]
    fn test_console_restores_the_link_display() {
        let mut rig = setup();
        rig.host.set_memory(crate::hostmap::LINK_DISPLAY, 0x42);

        press_key(&mut rig, KEY_STORE);
        assert_ne!(0x42, rig.host.memory(crate::hostmap::LINK_DISPLAY));

        // Cancelling puts back whatever the host was showing.
        press_key(&mut rig, KEY_STORE);
        assert_eq!(0x42, rig.host.memory(crate::hostmap::LINK_DISPLAY));
    }

    #[test]
    fn test_sysex_sample_dump_loads_active_sram() {
        let mut rig = setup();

        let data = vec![0xa5u8; 512];
        let message = sysex::Message::SampleDump {
            bank: BankRef::Active,
            voice: Voice::Cowbell,
            name: "BELL".to_string(),
            data: data.clone(),
        };
        rig.usb.mock_event(&framed(&message));
        rig.bridge.step(Instant::now());
        assert_eq!(data, rig.host.voice_sram(Voice::Cowbell.index())[..512]);
    }

    #[test]
    fn test_sysex_sample_dump_to_numbered_bank_hits_storage() {
        let mut rig = setup();

        let message = sysex::Message::SampleDump {
            bank: BankRef::Bank(12),
            voice: Voice::Claps,
            name: "CLAP".to_string(),
            data: vec![1, 2, 3],
        };
        rig.usb.mock_event(&framed(&message));
        rig.bridge.step(Instant::now());

        // Storage took it; the bus never saw a load.
        let storage = BankStorage::new(rig.dir.path().join("banks"));
        let (name, data) = storage
            .first_sample(BankRef::Bank(12), Voice::Claps)
            .expect("expected stored sample");
        assert_eq!("CLAP", name);
        assert_eq!(vec![1, 2, 3], data);
    }

    #[test]
    fn test_sysex_ram_request_round_trip() {
        let mut rig = setup();

        // Seed pattern RAM through the bus.
        let image = vec![0x3cu8; 64];
        rig.bridge
            .arbiter_mut()
            .transaction()
            .expect("transaction failed")
            .load_ram(&vec![0x3c; 0x2000]);

        let request = sysex::Message::RamRequest {
            bank: BankRef::Active,
        };
        rig.usb.mock_event(&framed(&request));
        rig.bridge.step(Instant::now());

        let emitted = rig.usb.emitted_events();
        let reply = emitted.last().expect("expected a sysex reply");
        let decoded = sysex::Message::decode(reply).expect("decode failed");
        match decoded {
            sysex::Message::RamImage { bank, data } => {
                assert_eq!(BankRef::Active, bank);
                assert_eq!(image, data[..64]);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_program_change_loads_bank() {
        let mut rig = setup();

        let storage = BankStorage::new(rig.dir.path().join("banks"));
        storage
            .replace_sample(BankRef::Bank(5), Voice::Bass, "KICK", &[7u8; 64])
            .expect("replace failed");

        rig.usb.mock_event(&[0xc0, 5]);
        rig.bridge.step(Instant::now());
        assert_eq!(vec![7u8; 64], rig.host.voice_sram(Voice::Bass.index())[..64]);

        // Programs past the bank range are ignored.
        rig.usb.mock_event(&[0xc0, 100]);
        rig.bridge.step(Instant::now());
    }

    #[test]
    fn test_console_command_from_the_keyboard() {
        let mut rig = setup();

        // STORE, 4, 0, PLAY (command: MIDI channel), 0, 5, PLAY.
        press_key(&mut rig, KEY_STORE);
        assert_ne!(
            0,
            rig.host.memory(crate::hostmap::LED_SET_2) & LedSet2::LED_STORE.bits()
        );
        press_key(&mut rig, 4);
        press_key(&mut rig, 0);
        press_key(&mut rig, KEY_PLAY_STOP);
        press_key(&mut rig, 0);
        press_key(&mut rig, 5);
        press_key(&mut rig, KEY_PLAY_STOP);
        assert_eq!(
            0,
            rig.host.memory(crate::hostmap::LED_SET_2) & LedSet2::LED_STORE.bits()
        );

        // The new channel takes effect and persists.
        rig.usb.reset_emitted_events();
        rig.usb.mock_event(&[0x94, 36, 127]);
        rig.bridge.step(Instant::now());
        assert_eq!(1, rig.host.strobe_count(Voice::Bass.index()));

        let settings = Settings::open(rig.dir.path().join("settings.bin"));
        assert_eq!(5, settings.midi_channel());
    }

    #[test]
    fn test_reboot_command_pulses_host_reset() {
        let mut rig = setup();
        let t0 = Instant::now();

        press_key(&mut rig, KEY_STORE);
        press_key(&mut rig, 9);
        press_key(&mut rig, 9);
        press_key(&mut rig, KEY_PLAY_STOP);
        assert!(rig.host.host_in_reset());

        // Steps during the pulse are locked out; afterwards the host runs.
        rig.bridge.step(t0 + Duration::from_millis(50));
        assert!(rig.host.host_in_reset());
        rig.bridge.step(t0 + Duration::from_millis(250));
        assert!(!rig.host.host_in_reset());
    }

    #[test]
    fn test_boot_screen_shows_version() {
        let mut rig = setup();
        rig.bridge.boot();
        // 0.3.0 reads as "00" / "03" on the two displays.
        assert_eq!(0x00, rig.host.memory(crate::hostmap::PATT_DISPLAY));
        assert_eq!(0x03, rig.host.memory(crate::hostmap::LINK_DISPLAY));
    }
}
