use std::{
    io::{Error, ErrorKind, Read, Result},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{Mutex, MutexGuard},
};

use crate::protocol::{Operation, Serialize};

/// Something that can perform one request and hand back the server's text.
pub trait Transport: Send + Sync {
    fn do_request(&self, operation: &Operation) -> Result<String>;

    fn disconnect(&self) {}
}

/// Opens a fresh connection for every request.
pub struct BenchmarkClient {
    /// The address of the server.
    addr: SocketAddr,

    /// A handle on the connection of the request in flight, if any.
    active: Mutex<Option<TcpStream>>,
}

impl BenchmarkClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<TcpStream>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn exchange(stream: &mut TcpStream, operation: &Operation) -> Result<String> {
        operation.command.serialize(stream)?;

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;

        String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }
}

impl Transport for BenchmarkClient {
    /// Connects, sends the operation's code and reads until the server closes.
    fn do_request(&self, operation: &Operation) -> Result<String> {
        let mut stream = TcpStream::connect(self.addr)?;
        stream.set_nodelay(true)?;
        *self.active() = Some(stream.try_clone()?);

        let response = Self::exchange(&mut stream, operation);

        self.active().take();
        let _ = stream.shutdown(Shutdown::Both);
        response
    }

    /// Cuts the request in flight, if there is one. Safe to call any number of times.
    fn disconnect(&self) {
        if let Some(stream) = self.active().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OPERATIONS;
    use std::{
        io::Write,
        net::TcpListener,
        sync::Arc,
        thread,
        time::Duration,
    };

    #[test]
    fn reads_until_the_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = BenchmarkClient::new(listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut code = [0u8; 1];
            stream.read_exact(&mut code).unwrap();
            stream.write_all(b"first half, ").unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
            stream.write_all(b"second half").unwrap();
            code[0]
        });

        let response = client.do_request(&OPERATIONS[3]).unwrap();
        assert_eq!(response, "first half, second half");
        assert_eq!(server.join().unwrap(), 0x44);
    }

    #[test]
    fn undecodable_response_is_invalid_data() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = BenchmarkClient::new(listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut code = [0u8; 1];
            stream.read_exact(&mut code).unwrap();
            stream.write_all(&[0xff, 0xfe]).unwrap();
        });

        let err = client.do_request(&OPERATIONS[0]).unwrap_err();
        server.join().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn connect_failure_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let client = BenchmarkClient::new(addr);
        assert!(client.do_request(&OPERATIONS[0]).is_err());
    }

    #[test]
    fn disconnect_cuts_a_hung_request() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = Arc::new(BenchmarkClient::new(listener.local_addr().unwrap()));

        // Accept and hold the connection open without answering.
        let server = thread::spawn(move || listener.accept().unwrap());

        let requester = {
            let client = client.clone();
            thread::spawn(move || client.do_request(&OPERATIONS[1]))
        };

        let _held = server.join().unwrap();
        thread::sleep(Duration::from_millis(50));
        client.disconnect();
        client.disconnect();

        // The read ends early with nothing from the server.
        let response = requester.join().unwrap();
        assert!(response.map_or(true, |text| text.is_empty()));
    }
}
