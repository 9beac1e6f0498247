use crate::device::*;
use rand::prelude::*;
use rusb::{request_type, Direction, Recipient, RequestType};
use std::fmt::Write;
use std::time::Instant;
use usbd_capture::buffer_pool::DEFAULT_BUFFER_SIZE;
use usbd_capture::{capture, vendor};

pub type TestFn = fn(&mut DeviceHandles, &mut String) -> ();

const BULK_IN_REPEATS: usize = 10_000;

macro_rules! tests {
    { $(fn $name:ident($dev:ident, $out:ident) $body:expr)* } => {
        pub fn get_tests() -> Vec<(&'static str, TestFn)> {
            let mut tests: Vec<(&'static str, TestFn)> = Vec::new();

            $(
                fn $name($dev: &mut DeviceHandles, $out: &mut String) {
                    $body
                }

                tests.push((stringify!($name), $name));
            )*

            tests
        }
    }
}

tests! {

fn configuration_value(dev, _out) {
    assert_eq!(dev.active_configuration().expect("get configuration"), 1);
}

fn device_identity(dev, _out) {
    assert_eq!(dev.device_descriptor.max_packet_size(), 64);
    assert_eq!(dev.device_descriptor.num_configurations(), 1);

    assert_eq!(
        dev.read_manufacturer_string(dev.en_us, &dev.device_descriptor, TIMEOUT)
            .expect("read manufacturer"),
        capture::MANUFACTURER);
    assert_eq!(
        dev.read_serial_number_string(dev.en_us, &dev.device_descriptor, TIMEOUT)
            .expect("read serial number"),
        capture::SERIAL_NUMBER);

    assert_eq!(dev.config_descriptor.num_interfaces(), 1);
}

fn vendor_out(dev, _out) {
    assert_eq!(
        dev.write_control(
            request_type(Direction::Out, RequestType::Vendor, Recipient::Device),
            vendor::ECHO_REQUEST, 0, 0,
            vendor::EXPECTED_PAYLOAD, TIMEOUT).expect("control write"),
        vendor::EXPECTED_PAYLOAD.len());
}

fn vendor_in(dev, _out) {
    let mut response = [0u8; 16];

    let len = dev.read_control(
        request_type(Direction::In, RequestType::Vendor, Recipient::Device),
        vendor::ECHO_REQUEST, 0, 0,
        &mut response, TIMEOUT).expect("control read");

    assert_eq!(&response[..len], vendor::REPLY);
}

fn vendor_unknown_request_stalls(dev, _out) {
    let mut response = [0u8; 16];

    let res = dev.read_control(
        request_type(Direction::In, RequestType::Vendor, Recipient::Device),
        vendor::ECHO_REQUEST + 1, 0, 0,
        &mut response, TIMEOUT);

    assert_eq!(res, Err(rusb::Error::Pipe));

    // The control pipe recovers on the next request.
    let len = dev.read_control(
        request_type(Direction::In, RequestType::Vendor, Recipient::Device),
        vendor::ECHO_REQUEST, 0, 0,
        &mut response, TIMEOUT).expect("control read");

    assert_eq!(&response[..len], vendor::REPLY);
}

fn bulk_in(dev, out) {
    dev.claim_interface(0).expect("claim interface");

    let bulk_in = dev.bulk_in;
    let mut data = [0u8; DEFAULT_BUFFER_SIZE];

    let start = Instant::now();

    for _ in 0..BULK_IN_REPEATS {
        let len = dev.read_bulk(bulk_in, &mut data, TIMEOUT).expect("bulk read");
        assert_eq!(len, data.len());
    }

    let elapsed = start.elapsed().as_secs_f64();
    let bytes = (DEFAULT_BUFFER_SIZE * BULK_IN_REPEATS) as f64;

    writeln!(
        out,
        "  {} transfers in {:.3} s, {:.2} MB/s",
        BULK_IN_REPEATS,
        elapsed,
        bytes / elapsed / 1e6).expect("write failed");
}

fn bulk_out(dev, _out) {
    dev.claim_interface(0).expect("claim interface");

    let bulk_out = dev.bulk_out;
    let data: Vec<u8> = (0..DEFAULT_BUFFER_SIZE).map(|i| (i + 2) as u8).collect();

    assert_eq!(
        dev.write_bulk(bulk_out, &data, TIMEOUT).expect("bulk write"),
        data.len());
}

fn bulk_out_random(dev, _out) {
    dev.claim_interface(0).expect("claim interface");

    let bulk_out = dev.bulk_out;
    let mut data = vec![0u8; DEFAULT_BUFFER_SIZE];
    rand::thread_rng().fill(&mut data[..]);

    assert_eq!(
        dev.write_bulk(bulk_out, &data, TIMEOUT).expect("bulk write"),
        data.len());
}

}
