// End-to-end session behaviour against in-memory collaborators
use std::io::Write;
use std::sync::Arc;

use var_server_session::wire::{decode_binary, BinaryOptions};
use var_server_session::{
    LinearUnitSystem, ManualClock, MockTransport, SessionConfig, SessionError, SessionServices,
    SimCell, SimClock, SimValue, SymbolTable, TypeDescriptor, VarKind, VariableServerSession,
    WriteOutcome,
};

struct Fixture {
    session: VariableServerSession,
    table: Arc<SymbolTable>,
    transport: MockTransport,
    clock: Arc<ManualClock>,
}

fn fixture(config: SessionConfig) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = Arc::new(SymbolTable::new());
    table
        .insert("ball.speed", TypeDescriptor::scalar(VarKind::Double, "m/s"))
        .set_f64(2.5);
    table
        .insert("ball.count", TypeDescriptor::scalar(VarKind::Int, "1"))
        .set_i32(-7);

    let clock = Arc::new(ManualClock::new(1000));
    let transport = MockTransport::new();
    let services = SessionServices {
        resolver: table.clone(),
        units: Arc::new(LinearUnitSystem::new()),
        clock: clock.clone(),
    };
    let session = VariableServerSession::new(&config, services, Box::new(transport.clone()))
        .expect("valid config");

    Fixture {
        session,
        table,
        transport,
        clock,
    }
}

fn insert(table: &SymbolTable, name: &str, kind: VarKind, units: &str) -> SimCell {
    table.insert(name, TypeDescriptor::scalar(kind, units))
}

#[test]
fn test_send_once_count_mismatch_sends_nothing() {
    let mut fx = fixture(SessionConfig::default());

    let err = fx.session.var_send_once("a,b,c", 2).unwrap_err();
    assert!(matches!(
        err,
        SessionError::NameCountMismatch {
            given: 3,
            expected: 2
        }
    ));
    assert!(fx.transport.packets().is_empty());
}

#[test]
fn test_send_once_with_no_names_sends_nothing() {
    let mut fx = fixture(SessionConfig::default());
    assert_eq!(fx.session.var_send_once("", 0).unwrap(), WriteOutcome::Empty);

    fx.session.var_binary();
    assert_eq!(fx.session.var_send_once(" ", 0).unwrap(), WriteOutcome::Empty);
    assert!(fx.transport.packets().is_empty());
}

#[test]
fn test_send_once_ignores_trailing_comma() {
    let mut fx = fixture(SessionConfig::default());
    let outcome = fx.session.var_send_once("ball.speed,ball.count,", 2).unwrap();
    assert!(outcome.is_sent());
    assert_eq!(fx.transport.written(), b"5\t2.5\t-7\n".to_vec());
}

#[test]
fn test_float_variable_in_ascii() {
    let mut fx = fixture(SessionConfig::default());
    let cell = insert(&fx.table, "ball.drag", VarKind::Float, "1");
    cell.set_f32(0.1);

    fx.session.var_add("ball.drag");
    fx.session.var_send().unwrap();
    assert_eq!(fx.transport.written(), b"0\t0.1\n".to_vec());
}

#[test]
fn test_send_once_uses_send_once_type() {
    let mut fx = fixture(SessionConfig::default());
    fx.session.var_add("ball.count");

    let outcome = fx.session.var_send_once("ball.speed, ghost", 2).unwrap();
    assert!(outcome.is_sent());
    assert_eq!(fx.transport.written(), b"5\t2.5\tBAD_REF\n".to_vec());

    // The subscribed set is untouched
    assert_eq!(fx.session.subscribed_names(), vec!["ball.count".to_string()]);
}

#[test]
fn test_write_path_skips_when_lock_is_held() {
    let mut fx = fixture(SessionConfig::default());
    fx.session.var_add("ball.speed");
    fx.session.copy_step();

    let copier = fx.session.copier();
    let guard = copier.try_acquire().expect("lock is free");

    let outcome = fx.session.write_data().unwrap();
    assert_eq!(outcome, WriteOutcome::Contended);
    assert!(fx.transport.written().is_empty());

    // A held lock also blocks one-shot sends without error
    assert_eq!(
        fx.session.var_send_once("ball.speed", 1).unwrap(),
        WriteOutcome::Contended
    );
    assert!(fx.transport.written().is_empty());

    drop(guard);
    assert!(fx.session.write_data().unwrap().is_sent());
    assert_eq!(fx.transport.written(), b"0\t2.5\n".to_vec());
}

#[test]
fn test_values_follow_subscription_order_with_duplicates() {
    let mut fx = fixture(SessionConfig::default());
    fx.session.var_add("ball.speed");
    fx.session.var_add("ball.count");
    fx.session.var_add("ball.speed");

    fx.session.var_send().unwrap();
    assert_eq!(fx.transport.written(), b"0\t2.5\t-7\t2.5\n".to_vec());

    fx.transport.clear();
    assert!(fx.session.var_remove("ball.speed"));
    fx.session.var_send().unwrap();
    assert_eq!(fx.transport.written(), b"0\t-7\t2.5\n".to_vec());

    fx.transport.clear();
    fx.session.var_clear();
    assert_eq!(fx.session.var_send().unwrap(), WriteOutcome::Empty);
    assert!(fx.transport.written().is_empty());
}

#[test]
fn test_late_resolution() {
    let mut fx = fixture(SessionConfig::default());
    fx.session.var_add("ball.later");
    fx.session.var_send().unwrap();
    assert_eq!(fx.transport.written(), b"0\tBAD_REF\n".to_vec());

    insert(&fx.table, "ball.later", VarKind::Short, "1").set_i16(42);
    fx.transport.clear();
    fx.session.var_send().unwrap();
    assert_eq!(fx.transport.written(), b"0\t42\n".to_vec());
}

#[test]
fn test_feet_to_meters_in_ascii() {
    let mut fx = fixture(SessionConfig::default());
    insert(&fx.table, "ball.altitude", VarKind::Double, "ft").set_f64(10.0);

    fx.session.var_add_with_units("ball.altitude", "m").unwrap();
    fx.session.var_send().unwrap();

    let text = String::from_utf8(fx.transport.written()).unwrap();
    let token = text
        .strip_prefix("0\t")
        .and_then(|rest| rest.strip_suffix('\n'))
        .unwrap();
    let (number, units) = token.split_once(' ').unwrap();
    assert!((number.parse::<f64>().unwrap() - 3.048).abs() < 1e-9);
    assert_eq!(units, "{m}");
}

#[test]
fn test_failed_units_request_keeps_subscription() {
    let mut fx = fixture(SessionConfig::default());
    let err = fx.session.var_add_with_units("ball.speed", "furlong").unwrap_err();
    assert!(matches!(err, SessionError::UnitParse { .. }));
    assert_eq!(fx.session.subscribed_names(), vec!["ball.speed".to_string()]);

    fx.session.var_send().unwrap();
    assert_eq!(fx.transport.written(), b"0\t2.5\n".to_vec());
}

#[test]
fn test_binary_round_trip_with_and_without_byteswap() {
    for byteswap in [false, true] {
        let mut fx = fixture(SessionConfig::new().with_binary(true).with_byteswap(byteswap));
        insert(&fx.table, "flag", VarKind::Boolean, "1").set_bool(true);
        insert(&fx.table, "temp", VarKind::Float, "Celsius").set_f32(-40.5);
        fx.table
            .insert("mode", TypeDescriptor::bitfield(true, 4, 3, 4))
            .set_field(3, 4, 0b1101);

        for name in ["ball.speed", "ball.count", "flag", "temp", "mode"] {
            fx.session.var_add(name);
        }
        fx.session.var_send().unwrap();

        let packets = fx.transport.packets();
        assert_eq!(packets.len(), 1);
        let options = BinaryOptions {
            include_names: true,
            byteswap,
        };
        let decoded = decode_binary(&packets[0], options).unwrap();
        assert_eq!(decoded.message_type, 0);

        let names: Vec<_> = decoded
            .variables
            .iter()
            .map(|v| v.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["ball.speed", "ball.count", "flag", "temp", "mode"]);

        let values: Vec<_> = decoded.variables.iter().map(|v| v.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                SimValue::Float(2.5),
                SimValue::Integer(-7),
                SimValue::Boolean(true),
                SimValue::Float(-40.5),
                SimValue::Integer(-3),
            ]
        );
        assert_eq!(decoded.variables[4].type_code, 12);
    }
}

#[test]
fn test_binary_nonames() {
    let mut fx = fixture(SessionConfig::default());
    fx.session.var_binary_nonames();
    fx.session.var_add("ball.count");
    fx.session.var_send().unwrap();

    let packets = fx.transport.packets();
    let packet = &packets[0];
    // header + type + size + int value
    assert_eq!(packet.len(), 12 + 4 + 4 + 4);

    let options = BinaryOptions {
        include_names: false,
        byteswap: false,
    };
    let decoded = decode_binary(packet, options).unwrap();
    assert_eq!(decoded.payload_size, 16);
    assert_eq!(decoded.variables[0].name, None);
    assert_eq!(decoded.variables[0].value, SimValue::Integer(-7));
}

#[test]
fn test_large_binary_set_is_chunked() {
    let mut fx = fixture(SessionConfig::new().with_binary(true));
    let mut expected = Vec::new();
    for i in 0..600 {
        let name = format!("model.sensor_{:03}", i);
        insert(&fx.table, &name, VarKind::Double, "m").set_f64(i as f64);
        fx.session.var_add(&name);
        expected.push(name);
    }

    let outcome = fx.session.var_send().unwrap();
    let packets = fx.transport.packets();
    assert!(packets.len() >= 2);
    assert!(matches!(outcome, WriteOutcome::Sent { messages, .. } if messages == packets.len()));

    let mut names = Vec::new();
    for packet in &packets {
        assert!(packet.len() <= 8192);
        let decoded = decode_binary(packet, BinaryOptions::default()).unwrap();
        names.extend(decoded.variables.into_iter().map(|v| v.name.unwrap()));
    }
    assert_eq!(names, expected);
}

#[test]
fn test_var_exists_replies() {
    let mut fx = fixture(SessionConfig::default());
    assert!(fx.session.var_exists("ball.speed").unwrap());
    assert!(!fx.session.var_exists("ball.missing").unwrap());
    assert_eq!(
        fx.transport.packets(),
        vec![b"1\t1\n".to_vec(), b"1\t0\n".to_vec()]
    );

    fx.transport.clear();
    fx.session.var_binary();
    fx.session.var_exists("ball.speed").unwrap();
    let mut expected = 1i32.to_ne_bytes().to_vec();
    expected.push(1);
    assert_eq!(fx.transport.written(), expected);

    fx.transport.clear();
    fx.session.var_byteswap(true);
    fx.session.var_exists("ball.missing").unwrap();
    let mut expected = 1i32.to_ne_bytes().to_vec();
    expected.reverse();
    expected.push(0);
    assert_eq!(fx.transport.written(), expected);
}

#[test]
fn test_list_size_replies() {
    let mut fx = fixture(SessionConfig::default());
    fx.session.var_add("ball.speed");
    fx.session.var_add("ball.count");

    assert_eq!(fx.session.send_list_size().unwrap(), 2);
    assert_eq!(fx.transport.written(), b"3\t2\n".to_vec());

    fx.transport.clear();
    fx.session.var_binary();
    fx.session.send_list_size().unwrap();
    let expected: Vec<u8> = [3i32, 0, 2]
        .iter()
        .flat_map(|v| v.to_ne_bytes())
        .collect();
    assert_eq!(fx.transport.written(), expected);
}

#[test]
fn test_short_write_is_an_error() {
    let mut fx = fixture(SessionConfig::default());
    fx.session.var_add("ball.speed");
    fx.transport.limit_writes(Some(3));

    let err = fx.session.var_send().unwrap_err();
    assert!(matches!(
        err,
        SessionError::ShortWrite {
            expected: 6,
            written: 3
        }
    ));
}

#[test]
fn test_file_transfer_is_chunked() {
    let mut fx = fixture(SessionConfig::default());
    let contents: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&contents).unwrap();
    file.flush().unwrap();

    let sent = fx.session.send_file(file.path()).unwrap();
    assert_eq!(sent, 10_000);

    let packets = fx.transport.packets();
    assert_eq!(packets[0], b"2\t10000\n".to_vec());
    let sizes: Vec<_> = packets[1..].iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4095, 4095, 1810]);
    assert_eq!(packets[1..].concat(), contents);
    assert_eq!(fx.transport.blocking_changes(), vec![true, false]);
}

#[test]
fn test_missing_file_announces_failure() {
    let mut fx = fixture(SessionConfig::default());
    let dir = tempfile::tempdir().unwrap();

    let err = fx.session.send_file(dir.path().join("S_sie.resource")).unwrap_err();
    assert!(matches!(err, SessionError::FileTransfer(_)));
    assert_eq!(fx.transport.written(), b"2\t-1\n".to_vec());
    assert!(fx.transport.blocking_changes().is_empty());
}

#[test]
fn test_scheduled_cycle_from_clock() {
    let mut fx = fixture(SessionConfig::default());
    fx.clock.set_tics(250);
    fx.session.var_cycle(0.1);
    fx.session.var_set_copy_mode(1).unwrap();

    assert_eq!(fx.session.cadence().cycle_tics(), 100);
    assert_eq!(fx.session.cadence().next_tics(), 300);

    fx.clock.set_tics(300);
    assert!(fx.session.cadence().is_copy_due(fx.clock.current_tics()));
}
