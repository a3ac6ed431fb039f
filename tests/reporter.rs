//! The reporter is process-wide, so everything that installs one lives in this single test.

use std::sync::{Arc, Mutex};

use craft_refcell::finalize::{self, Origin};
use craft_refcell::{BorrowCell, Close, Error};

struct Faulty;

impl Close for Faulty {
    type Error = std::io::Error;

    fn close(self) -> Result<(), Self::Error> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "device busy"))
    }
}

struct Panicky;

impl Close for Panicky {
    type Error = std::convert::Infallible;

    fn close(self) -> Result<(), Self::Error> {
        panic!("close exploded");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn swallowed_failures_are_reported() {
    init_tracing();

    let seen = Arc::new(Mutex::new(Vec::new()));

    {
        let seen = seen.clone();

        finalize::set_reporter(move |failure| {
            assert!(matches!(failure.error(), Error::Release(_)));
            seen.lock().unwrap().push((
                failure.origin(),
                failure.type_name(),
                failure.error().to_string(),
            ));
        });
    }

    // Owner dropped without closing.
    drop(BorrowCell::with_close(Faulty));

    // Last handle dropped after the owner closed.
    let cell = BorrowCell::with_close(Faulty);
    let handle = cell.try_borrow().unwrap();
    cell.close().unwrap();
    drop(handle);

    let cell = BorrowCell::with_close(Faulty);
    let handle = cell.try_borrow_mut().unwrap();
    drop(cell);
    drop(handle);

    // A panicking release action is contained.
    drop(BorrowCell::with_close(Panicky));

    // A panicking reporter is contained too.
    finalize::set_reporter(|_| panic!("reporter exploded"));
    drop(BorrowCell::with_close(Faulty));

    finalize::clear_reporter();
    drop(BorrowCell::with_close(Faulty));

    let seen = seen.lock().unwrap();
    let faulty = std::any::type_name::<Faulty>();
    let panicky = std::any::type_name::<Panicky>();

    assert_eq!(
        *seen,
        [
            (Origin::Cell, faulty, String::from("failed to release resource: device busy")),
            (Origin::SharedHandle, faulty, String::from("failed to release resource: device busy")),
            (Origin::ExclusiveHandle, faulty, String::from("failed to release resource: device busy")),
            (
                Origin::Cell,
                panicky,
                String::from("failed to release resource: release action panicked: close exploded"),
            ),
        ]
    );
}
