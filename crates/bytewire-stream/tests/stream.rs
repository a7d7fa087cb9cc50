use bytewire_core::{config::Config, constants::SBO_SIZE, source::ByteSource};
use bytewire_stream::{BinaryStream, Decode, Encode, FileReader, FileWriter, MemorySource};

#[test]
fn test_stream_codec_layout() {
    let mut sink = MemorySource::new();
    {
        let mut stream = BinaryStream::with_source(&mut sink);
        stream.write_u32(0x01020304).write_str("abc").write_slice(&[1u16, 2, 3]);
        stream.flush();
    }
    assert_eq!(
        sink.as_slice(),
        &[
            0x04, 0x03, 0x02, 0x01, 0x03, 0x00, 0x61, 0x62, 0x63, 0x03, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x02, 0x00, 0x03, 0x00
        ]
    );
}

#[test]
fn test_endianness() {
    let mut stream = BinaryStream::new();
    stream.write_u32(0x12345678);
    assert_eq!(stream.data(), &[0x78, 0x56, 0x34, 0x12]);
}

#[test]
fn test_string_layout() {
    let mut stream = BinaryStream::new();
    stream.write_str("hello");
    assert_eq!(stream.data(), &[0x05, 0x00, 0x68, 0x65, 0x6C, 0x6C, 0x6F]);
    assert_eq!(stream.read_string().unwrap(), "hello");
}

#[test]
fn test_buffer_promotion_preserves_data() {
    let mut stream = BinaryStream::new();
    assert!(stream.is_inline());
    stream.write_bytes(&[b'A'; 513]);
    assert_eq!(stream.size(), 513);
    assert!(stream.capacity() >= 513);
    assert!(!stream.is_inline());

    stream.write_bytes(&[b'B'; 512]);
    assert_eq!(stream.size(), 1025);
    assert!(stream.data()[..513].iter().all(|&b| b == b'A'));
    assert!(stream.data()[513..].iter().all(|&b| b == b'B'));
}

#[test]
fn test_rewind_and_undo() {
    let mut stream = BinaryStream::new();
    let bytes: Vec<u8> = (0..100).collect();
    stream.write_bytes(&bytes);

    stream.rewind(20);
    let mut rest = [0u8; 80];
    assert_eq!(stream.read_bytes(&mut rest), 80);
    assert_eq!(&rest[..], &bytes[20..]);

    stream.rewind(50);
    stream.skip(10);
    // read head is now 60
    stream.undo(15);
    assert_eq!(stream.read_u8().unwrap(), 45);
    stream.undo(1000);
    assert_eq!(stream.read_u8().unwrap(), 0);
}

#[derive(Debug, PartialEq)]
struct Point {
    x: i16,
    y: i16,
    label: String,
}

impl Encode for Point {
    fn encode(&self, out: &mut BinaryStream<'_>) {
        out.write_i16(self.x).write_i16(self.y).write_str(&self.label);
    }
}

impl Decode for Point {
    fn decode(input: &mut BinaryStream<'_>) -> std::io::Result<Self> {
        Ok(Point { x: input.read_i16()?, y: input.read_i16()?, label: input.read_string()? })
    }
}

#[test]
fn test_user_type_items() {
    let points = vec![
        Point { x: 1, y: -1, label: "a".into() },
        Point { x: 300, y: 7, label: "bc".into() },
    ];
    let mut stream = BinaryStream::new();
    stream.write_items(&points);
    assert_eq!(&stream.data()[..4], &[2, 0, 0, 0]);
    let back: Vec<Point> = stream.read_items().unwrap();
    assert_eq!(back, points);
}

#[test]
fn test_config_capacity() {
    let config = Config::default().with_stream_buffer_size(4 * SBO_SIZE);
    let stream = BinaryStream::with_config(&config);
    assert_eq!(stream.capacity(), 4 * SBO_SIZE);
    assert!(!stream.is_inline());
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("values.bin");

    let mut writer = FileWriter::create(&path).unwrap();
    {
        let mut stream = BinaryStream::with_source(&mut writer);
        stream.write_u64(u64::MAX).write_f32(1.5).write_wstr("wide").write_bool(true);
        stream.write_bytes(&[9u8; 2000]);
    }
    drop(writer);

    let mut reader = FileReader::open(&path).unwrap();
    let mut stream = BinaryStream::with_source(&mut reader);
    assert_eq!(stream.peek_u64(), Some(u64::MAX));
    assert_eq!(stream.read_u64().unwrap(), u64::MAX);
    assert_eq!(stream.read_f32().unwrap(), 1.5);
    assert_eq!(stream.read_wstring().unwrap(), "wide");
    assert!(stream.read_bool().unwrap());
    let mut tail = vec![0u8; 2000];
    assert_eq!(stream.read_bytes(&mut tail), 2000);
    assert!(tail.iter().all(|&b| b == 9));
    assert!(stream.read_u8().is_err());
}

#[test]
fn test_available_includes_source() {
    let mut source = MemorySource::from(vec![0u8; 40]);
    let mut stream = BinaryStream::with_source(&mut source);
    assert_eq!(stream.available(), 40);
    stream.read_u32().unwrap();
    assert_eq!(stream.available(), 36);
    assert!(stream.good());
    let source = stream.source().unwrap();
    assert_eq!(source.available(), 0);
}
