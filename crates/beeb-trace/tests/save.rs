use std::cell::Cell;
use std::io;
use std::sync::Arc;

use beeb_trace::{
    EventFormatter, SaveContext, SaveOutcome, SaveProgress, SaveTraceError, Trace, TraceConfig,
    TraceEvent, TraceEventRegistry, TraceEventSource, TraceEventType, TraceOutputFlags,
    TraceSaver,
};
use emu_core::Ticks;

struct Fixture {
    trace: Trace,
    byte: TraceEventType,
}

fn fixture() -> Fixture {
    let mut registry = TraceEventRegistry::new();
    let byte = registry.register("byte", 1, TraceEventSource::Host);
    Fixture {
        trace: Trace::new(Arc::new(registry), TraceConfig::default()),
        byte,
    }
}

fn save(trace: &Trace, flags: TraceOutputFlags) -> String {
    let mut out = Vec::new();
    let outcome = TraceSaver::new(trace, flags)
        .save(&mut out, || false, None)
        .expect("save");
    assert_eq!(outcome, SaveOutcome::Completed);
    String::from_utf8(out).expect("utf8")
}

struct ByteFormatter;

impl EventFormatter for ByteFormatter {
    fn format(&mut self, event: &TraceEvent<'_>, ctx: &mut SaveContext, out: &mut String) {
        out.push_str(ctx.time_prefix());
        out.push_str(&format!("byte ${:02x}\n", event.data[0]));
    }
}

#[test]
fn strings_get_a_padded_time_column() {
    let mut f = fixture();
    f.trace.set_time(Ticks(1000));
    f.trace.alloc_string("first").expect("alloc");
    f.trace.set_time(Ticks(1012));
    f.trace.alloc_string("second\n").expect("alloc");

    let text = save(&f.trace, TraceOutputFlags::CYCLES | TraceOutputFlags::ABSOLUTE_CYCLES);
    assert_eq!(text, "1000  first\n1012  second\n");

    // Relative to the first event, the widest time is 12.
    let text = save(&f.trace, TraceOutputFlags::CYCLES);
    assert_eq!(text, " 0  first\n12  second\n");
}

#[test]
fn continuation_lines_line_up_under_the_text() {
    let mut f = fixture();
    f.trace.set_time(Ticks(5));
    f.trace.alloc_string("line one\nline two").expect("alloc");

    let text = save(&f.trace, TraceOutputFlags::CYCLES | TraceOutputFlags::ABSOLUTE_CYCLES);
    assert_eq!(text, "5  line one\n   line two\n");
}

#[test]
fn no_cycles_means_no_prefix() {
    let mut f = fixture();
    f.trace.set_time(Ticks(77));
    f.trace.alloc_string("bare").expect("alloc");

    assert_eq!(save(&f.trace, TraceOutputFlags::NONE), "bare\n");
}

#[test]
fn events_without_a_formatter_get_a_generic_line() {
    let mut f = fixture();
    f.trace.write_event(f.byte, &[0x42]).expect("alloc");

    assert_eq!(
        save(&f.trace, TraceOutputFlags::CYCLES),
        "EVENT: type=byte; size=1\n"
    );
}

#[test]
fn registered_formatters_handle_their_types() {
    let mut f = fixture();
    f.trace.set_time(Ticks(3));
    f.trace.write_event(f.byte, &[0x42]).expect("alloc");

    let mut out = Vec::new();
    TraceSaver::new(&f.trace, TraceOutputFlags::CYCLES | TraceOutputFlags::ABSOLUTE_CYCLES)
        .with_formatter(&[f.byte], ByteFormatter)
        .save(&mut out, || false, None)
        .expect("save");
    assert_eq!(String::from_utf8(out).expect("utf8"), "3  byte $42\n");
}

#[test]
fn parasite_events_add_a_source_column() {
    let mut registry = TraceEventRegistry::new();
    let host = registry.register("host byte", 1, TraceEventSource::Host);
    let parasite = registry.register("parasite byte", 1, TraceEventSource::Parasite);
    let mut trace = Trace::new(Arc::new(registry), TraceConfig::default());
    trace.set_time(Ticks(4));
    trace.write_event(host, &[1]).expect("alloc");
    trace.write_event(parasite, &[2]).expect("alloc");
    trace.alloc_string("text").expect("alloc");

    let mut out = Vec::new();
    TraceSaver::new(&trace, TraceOutputFlags::CYCLES | TraceOutputFlags::ABSOLUTE_CYCLES)
        .with_formatter(&[host, parasite], ByteFormatter)
        .save(&mut out, || false, None)
        .expect("save");
    assert_eq!(
        String::from_utf8(out).expect("utf8"),
        "4  H  byte $01\n4  P  byte $02\n4     text\n"
    );
}

#[test]
#[should_panic(expected = "already has a formatter")]
fn a_type_can_only_have_one_formatter() {
    let f = fixture();
    let _ = TraceSaver::new(&f.trace, TraceOutputFlags::default())
        .with_formatter(&[f.byte], ByteFormatter)
        .with_formatter(&[f.byte], ByteFormatter);
}

#[test]
fn cancellation_ends_the_output_with_a_note() {
    let mut f = fixture();
    for i in 0..10 {
        f.trace.alloc_fmt(format_args!("event {i}")).expect("alloc");
    }

    let polls = Cell::new(0);
    let progress = SaveProgress::new();
    let mut out = Vec::new();
    let outcome = TraceSaver::new(&f.trace, TraceOutputFlags::NONE)
        .save(
            &mut out,
            || {
                polls.set(polls.get() + 1);
                polls.get() == 3
            },
            Some(&progress),
        )
        .expect("save");

    assert_eq!(outcome, SaveOutcome::Canceled);
    assert_eq!(
        String::from_utf8(out).expect("utf8"),
        "event 0\nevent 1\nevent 2\n(trace file output was canceled)\n"
    );
    assert_eq!(progress.events_handled(), 2);
    assert_eq!(progress.num_events(), 10);
    assert_eq!(progress.bytes_written(), 24);
}

#[test]
fn progress_counts_everything_on_completion() {
    let mut f = fixture();
    f.trace.alloc_string("a").expect("alloc");
    f.trace.alloc_string("b").expect("alloc");

    let progress = SaveProgress::new();
    let mut out = Vec::new();
    TraceSaver::new(&f.trace, TraceOutputFlags::NONE)
        .save(&mut out, || false, Some(&progress))
        .expect("save");

    assert_eq!(progress.events_handled(), 2);
    assert_eq!(progress.bytes_written(), out.len() as u64);
}

struct FailingWriter;

impl io::Write for FailingWriter {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_errors_are_returned() {
    let mut f = fixture();
    f.trace.alloc_string("x").expect("alloc");

    let result = TraceSaver::new(&f.trace, TraceOutputFlags::NONE).save(
        &mut FailingWriter,
        || false,
        None,
    );
    let Err(SaveTraceError::Io(error)) = result else {
        panic!("expected an I/O error");
    };
    assert_eq!(error.to_string(), "disk full");
}

#[test]
fn an_empty_trace_saves_nothing() {
    let f = fixture();
    assert_eq!(save(&f.trace, TraceOutputFlags::default()), "");
}
