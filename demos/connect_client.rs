//! Outbound counterpart to hello_server: connect, write, close.
//!
//! The run call returns on its own once the connection closes, because the
//! loop has nothing left registered.

use weir_io::error::Result;
use weir_io::net::tcp::Tcp;

fn main() -> Result<()> {
    let endpoint = Tcp::new()?;

    endpoint.connect("127.0.0.1", 5432, |conn| {
        println!("connected!");
        let closer = conn.clone();
        let result = conn.write(b"gheh!", move || {
            println!("written!");
            closer.close();
        });
        if let Err(e) = result {
            eprintln!("write failed: {e}");
        }
    })?;

    weir_io::run()
}
