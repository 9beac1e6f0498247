mod tests;

use crate::device::{open_device, DeviceHandles};
use crate::tests::{get_tests, TestFn};
use std::io::prelude::*;
use std::io::stdout;
use std::panic;

fn main() {
    let tests = get_tests();
    run_tests(&tests[..]);
}

fn run_tests(tests: &[(&str, TestFn)]) {
    println!("capture_host starting");
    println!("looking for device...");

    let ctx = rusb::Context::new().expect("create libusb context");

    let mut dev = match open_device(&ctx) {
        Ok(dev) => dev,
        Err(rusb::Error::NoDevice) => {
            println!("no capture device attached, skipping");
            return;
        }
        Err(err) => panic!("failed to open device: {}", err),
    };

    print_device_info(&dev);

    println!("\nrunning {} tests", tests.len());

    let mut success = 0;
    for (name, test) in tests {
        print!("test {} ... ", name);
        let _ = stdout().flush();

        let mut out = String::new();

        let res = {
            let hook = panic::take_hook();
            panic::set_hook(Box::new(|_| {}));
            let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                test(&mut dev, &mut out);
            }));
            panic::set_hook(hook);

            res
        };

        if let Err(err) = dev.release_interface(0) {
            if err != rusb::Error::NotFound {
                println!("Failed to release interface: {}", err);
                panic!("post test cleanup failed");
            }
        }

        if let Err(err) = res {
            let err = if let Some(err) = err.downcast_ref::<&'static str>() {
                String::from(*err)
            } else if let Some(err) = err.downcast_ref::<String>() {
                err.clone()
            } else {
                String::from("???")
            };

            println!("FAILED\nerror: {}\n", err);
        } else {
            println!("ok");

            if !out.is_empty() {
                print!("{}", out);
            }

            success += 1;
        }
    }

    println!("{} failed, {} succeeded", tests.len() - success, success);

    if success == tests.len() {
        println!("\nALL TESTS PASSED!");
    } else {
        std::process::exit(1);
    }
}

fn print_device_info(dev: &DeviceHandles) {
    let device = dev.handle.device();

    println!(
        "found {:04x}:{:04x} (bus {}, device {}), bulk IN 0x{:02x} OUT 0x{:02x}, {} byte packets",
        dev.device_descriptor.vendor_id(),
        dev.device_descriptor.product_id(),
        device.bus_number(),
        device.address(),
        dev.bulk_in,
        dev.bulk_out,
        dev.bulk_max_packet_size,
    );
}
