//! The canonical hello server: accept, greet, report the completed write.

use std::sync::Arc;

use weir_io::error::Result;
use weir_io::net::tcp::{config::TcpConfig, traits::StderrLogger, Tcp};

fn main() -> Result<()> {
    let config = TcpConfig::builder().logger(Arc::new(StderrLogger)).build();
    let server = Tcp::with_config(config)?;

    server.listen(8080, |client| {
        println!("connected!");
        println!("{client:?}");
        let result = client.write(b"HTTP/1.0 500 OK\r\n\r\nHello world!", || {
            println!("written!");
        });
        if let Err(e) = result {
            eprintln!("write failed: {e}");
        }
    })?;

    weir_io::run()
}
