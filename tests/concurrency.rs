//! Many clients against one server.

mod common;

use crossbeam_utils::thread;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use whoson::{Store, WhosonClient};

const CLIENTS: u8 = 8;
const LOGINS: u8 = 50;

#[test]
fn concurrent_logins_over_both_transports() {
    let server = common::start(common::local_config());
    let tcp_addr = server.tcp_addr().unwrap();
    let udp_addr = server.udp_addr().unwrap();

    thread::scope(|s| {
        for c in 0..CLIENTS {
            s.spawn(move |_| {
                let (mode, addr) = if c % 2 == 0 { ("tcp", tcp_addr) } else { ("udp", udp_addr) };
                let mut client = WhosonClient::dial(mode, addr).unwrap();
                let mut rng = SmallRng::seed_from_u64(c as u64);
                for i in 0..LOGINS {
                    let ip = format!("10.{}.0.{}", c, i);
                    let data = format!("user{}", rng.gen::<u32>());
                    assert!(client.login(&ip, &data).unwrap().is_positive());
                    assert_eq!(client.query(&ip).unwrap().msg(), data);
                }
                if mode == "tcp" {
                    client.quit().unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(server.store().count(), CLIENTS as usize * LOGINS as usize);
    server.shutdown().unwrap();
}

#[test]
fn concurrent_logins_on_one_ip_keep_one_record() {
    let server = common::start(common::local_config());
    let udp_addr = server.udp_addr().unwrap();

    thread::scope(|s| {
        for c in 0..CLIENTS {
            s.spawn(move |_| {
                let mut client = WhosonClient::dial("udp", udp_addr).unwrap();
                for i in 0..LOGINS {
                    client.login("10.9.9.9", &format!("c{}-{}", c, i)).unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(server.store().count(), 1);
    server.shutdown().unwrap();
}

#[test]
fn concurrent_logouts_leave_the_remaining_logins() {
    let server = common::start(common::local_config());
    let tcp_addr = server.tcp_addr().unwrap();
    let udp_addr = server.udp_addr().unwrap();

    thread::scope(|s| {
        for c in 0..CLIENTS {
            s.spawn(move |_| {
                let (mode, addr) = if c % 2 == 0 { ("udp", udp_addr) } else { ("tcp", tcp_addr) };
                let mut client = WhosonClient::dial(mode, addr).unwrap();
                for i in 0..LOGINS {
                    let ip = format!("10.{}.1.{}", c, i);
                    assert!(client.login(&ip, "user").unwrap().is_positive());
                }
                for i in (0..LOGINS).step_by(2) {
                    let ip = format!("10.{}.1.{}", c, i);
                    assert_eq!(client.logout(&ip).unwrap().msg(), "LOGOUT record deleted");
                    assert_eq!(client.query(&ip).unwrap().msg(), "Not Logged in");
                }
                if mode == "tcp" {
                    client.quit().unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(server.store().count(), CLIENTS as usize * LOGINS as usize / 2);
    server.shutdown().unwrap();
}
