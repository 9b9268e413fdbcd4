//! Echo server exercising the read path.

use std::sync::Arc;

use weir_io::error::Result;
use weir_io::net::tcp::{config::TcpConfig, traits::StderrLogger, Tcp};

fn main() -> Result<()> {
    let config = TcpConfig::builder().logger(Arc::new(StderrLogger)).build();
    let server = Tcp::with_config(config)?;

    let addr = server.listen(9000, |client| {
        let writer = client.clone();
        let result = client.read_start(move |data| {
            if let Err(e) = writer.send(data) {
                eprintln!("echo failed: {e}");
            }
        });
        if let Err(e) = result {
            eprintln!("read_start failed: {e}");
        }
    })?;

    println!("echo server listening on {addr}");
    weir_io::run()
}
