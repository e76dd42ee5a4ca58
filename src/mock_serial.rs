//! We use this mocking module in unit tests to emulate the instrument's serial port.

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Buffer to store data written to the mock serial port
    write_buffer: heapless::Vec<u8, 1024>,
    /// Buffer containing pre-configured response data to be read
    read_buffer: heapless::Vec<u8, 1024>,
    /// Current position in the read buffer
    read_position: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    /// Number of upcoming reads which fail with `read_failure`
    failing_reads: usize,
    read_failure: MockSerialError,
    /// Number of upcoming reads which stall for `read_delay` before returning
    slow_reads: usize,
    read_delay: std::time::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSerialError {
    /// Simulated timeout error
    Timeout,
    /// Simulated buffer overflow
    BufferOverflow,
    /// Simulated invalid data error, which is how a framing error shows up
    InvalidData,
    /// Generic simulated error for testing
    SimulatedError,
    /// Would block - no data available
    WouldBlock,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl core::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::InvalidData => embedded_io::ErrorKind::InvalidData,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }

        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }

        if self.slow_reads > 0 {
            self.slow_reads -= 1;
            std::thread::sleep(self.read_delay);
        }

        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(self.read_failure);
        }

        if self.read_position >= self.read_buffer.len() {
            return Err(MockSerialError::WouldBlock);
        }

        let available_bytes = self.read_buffer.len() - self.read_position;
        let bytes_to_read = core::cmp::min(buf.len(), available_bytes);

        buf[..bytes_to_read].copy_from_slice(
            &self.read_buffer[self.read_position..self.read_position + bytes_to_read],
        );

        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            should_error_on_read: false,
            failing_reads: 0,
            read_failure: MockSerialError::SimulatedError,
            slow_reads: 0,
            read_delay: std::time::Duration::ZERO,
        }
    }

    /// Set the data that will be returned when read() is called
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.queue_read_data(data)
    }

    /// Append to the data returned by read(), after anything already queued.
    pub fn queue_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Everything written so far, split into terminated commands.
    pub fn written_commands(&self) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.write_buffer);
        let mut commands: Vec<String> = text.split('\r').map(String::from).collect();
        // Drop whatever follows the last terminator.
        commands.pop();
        commands
    }

    /// Clear the write buffer
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// Bytes queued for reading which nobody has read yet.
    pub fn unread_len(&self) -> usize {
        self.read_buffer.len().saturating_sub(self.read_position)
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    /// Make the next `count` reads fail with `error`, after which reads behave normally.
    pub fn fail_next_reads(&mut self, count: usize, error: MockSerialError) {
        self.failing_reads = count;
        self.read_failure = error;
    }

    /// Make the next `count` reads stall for `delay` before returning, like an instrument slow to answer.
    pub fn delay_next_reads(&mut self, count: usize, delay: std::time::Duration) {
        self.slow_reads = count;
        self.read_delay = delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_write_multiple_times() {
        let mut mock = MockSerial::new();
        mock.write(b"A0 73\r").unwrap();
        mock.write(b"S\r").unwrap();

        assert_eq!(mock.written_data(), b"A0 73\rS\r");
        assert_eq!(mock.written_commands(), vec!["A0 73", "S"]);
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let large_data = vec![0u8; 2000];

        let result = mock.write(&large_data);
        assert!(matches!(result, Err(MockSerialError::BufferOverflow)));
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"10\r01\r").unwrap();

        let mut buffer = [0u8; 3];
        assert_eq!(mock.read(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer, b"10\r");
        assert_eq!(mock.unread_len(), 3);
    }

    #[test]
    fn test_queue_read_data_appends() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"0\r").unwrap();
        mock.queue_read_data(b"1\r").unwrap();

        let mut buffer = [0u8; 8];
        assert_eq!(mock.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer[..4], b"0\r1\r");
    }

    #[test]
    fn test_read_would_block_after_data_exhausted() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Hi").unwrap();

        let mut buffer = [0u8; 10];
        assert!(mock.read(&mut buffer).is_ok());
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::WouldBlock)
        ));
    }

    #[test]
    fn test_fail_next_reads_then_recover() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"0\r").unwrap();
        mock.fail_next_reads(1, MockSerialError::InvalidData);

        let mut buffer = [0u8; 4];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::InvalidData)
        ));
        assert_eq!(mock.read(&mut buffer).unwrap(), 2);
    }

    #[test]
    fn test_delayed_read_still_returns_data() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"0\r").unwrap();
        mock.delay_next_reads(1, std::time::Duration::from_millis(20));

        let start = std::time::Instant::now();
        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer).unwrap(), 2);
        assert!(start.elapsed() >= std::time::Duration::from_millis(20));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        assert!(mock.written_data().is_empty());

        mock.set_read_data(b"data").unwrap();
        mock.set_read_error(true);
        let mut buffer = [0u8; 10];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::SimulatedError)
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(
            MockSerialError::Timeout.kind(),
            embedded_io::ErrorKind::TimedOut
        ));
        assert!(matches!(
            MockSerialError::InvalidData.kind(),
            embedded_io::ErrorKind::InvalidData
        ));
        assert!(matches!(
            MockSerialError::WouldBlock.kind(),
            embedded_io::ErrorKind::Other
        ));
    }

    #[test]
    fn test_clear_written_data() {
        let mut mock = MockSerial::new();
        mock.write(b"test data").unwrap();
        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }
}
