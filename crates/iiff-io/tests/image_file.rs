use approx::assert_relative_eq;
use iiff_io::{
    AccessMode, Component, ComponentBuffer, ComponentType, EngineConfig, Endianness, ErrorCode, FillValue,
    ImageFile, ImageSpec, WHOLE_LINE,
};
use std::path::Path;
use tempfile::tempdir;

fn rgb_line(width: usize, r: u8, g: u8, b: u8) -> Vec<ComponentBuffer> {
    vec![
        ComponentBuffer::Byte(vec![r; width]),
        ComponentBuffer::Byte(vec![g; width]),
        ComponentBuffer::Byte(vec![b; width]),
    ]
}

fn read_rgb(image: &mut ImageFile, y: u32) -> Vec<(u8, u8, u8)> {
    let width = image.resolution().expect("resolution").0 as usize;
    let mut line = ComponentBuffer::for_table(image.components().expect("components"), width);
    image.read_line(y, &mut line).expect("read line");
    match (&line[0], &line[1], &line[2]) {
        (ComponentBuffer::Byte(r), ComponentBuffer::Byte(g), ComponentBuffer::Byte(b)) => {
            (0..width).map(|i| (r[i], g[i], b[i])).collect()
        }
        other => panic!("unexpected buffers {:?}", other),
    }
}

fn create_rgb(path: &Path, width: u32, height: u32, config: &EngineConfig) -> ImageFile {
    let spec = ImageSpec::parse_components(width, height, "R:byte,G:byte,B:byte").expect("spec");
    ImageFile::create(path, &spec, config).expect("create")
}

#[test]
fn write_then_read_rgb_with_zero_fill() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("rgb.iif");
    let config = EngineConfig::host();

    let mut image = create_rgb(&path, 4, 2, &config);
    image.write_line(0, &rgb_line(4, 10, 20, 30)).expect("write");
    image.close().expect("close");

    let mut image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(image.resolution().expect("resolution"), (4, 2));
    assert_eq!(read_rgb(&mut image, 0), vec![(10, 20, 30); 4]);
    assert_eq!(read_rgb(&mut image, 1), vec![(0, 0, 0); 4]);

    let header = image.header().expect("header");
    assert_eq!(header.filename, "rgb.iif");
    assert!(!header.layout.computed);
    image.close().expect("close");

    // Header plus two 12-byte lines, no continuation.
    assert_eq!(std::fs::metadata(&path).expect("metadata").len(), 1024 + 24);
}

#[test]
fn fill_pixel_range_on_reopened_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("fill.iif");
    let config = EngineConfig::host();

    let mut image = create_rgb(&path, 4, 2, &config);
    image.write_line(0, &rgb_line(4, 10, 20, 30)).expect("write");
    image.close().expect("close");

    let mut image = ImageFile::open(&path, AccessMode::Update, &config).expect("open");
    image
        .define_fill_values(vec![FillValue::Byte(255), FillValue::Byte(0), FillValue::Byte(0)])
        .expect("fill values");
    image.fill_lines(0, 2, 1, 2).expect("fill");
    image.close().expect("close");

    let mut image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(
        read_rgb(&mut image, 0),
        [(10, 20, 30), (255, 0, 0), (255, 0, 0), (10, 20, 30)]
    );
    assert_eq!(read_rgb(&mut image, 1), [(0, 0, 0), (255, 0, 0), (255, 0, 0), (0, 0, 0)]);
}

#[test]
fn reserved_variable_name_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let config = EngineConfig::host();
    let mut image = create_rgb(&dir.path().join("r.iif"), 4, 2, &config);

    let err = image.put_text_var("IIF_Types", "x").unwrap_err();
    assert_eq!(err.code(), ErrorCode::ReservedName);
    assert_eq!(image.last_error(), ErrorCode::ReservedName);
    assert_eq!(image.last_error().message(), "variable name is reserved for the engine");
    image.close().expect("close");
}

#[test]
fn window_sees_last_write_in_any_order() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("window.iif");
    let width = 3;
    let height = 10u32;

    let config = EngineConfig::host().with_window_lines(3);
    let mut image = create_rgb(&path, width, height, &config);
    assert_eq!(image.window_lines().expect("lines"), 3);

    let order = [9u32, 0, 4, 5, 1, 8, 2, 3, 7, 6, 0, 9];
    for (n, &y) in order.iter().enumerate() {
        image
            .write_line(y, &rgb_line(width as usize, y as u8, n as u8, 7))
            .expect("write");
    }
    // Last partial window: lines 9..10 only.
    for y in (0..height).rev() {
        let n = order.iter().rposition(|&o| o == y).expect("written") as u8;
        assert_eq!(read_rgb(&mut image, y), vec![(y as u8, n, 7); 3]);
    }
    image.close().expect("close");

    let reopen = EngineConfig::host().with_window_lines(4);
    let mut image = ImageFile::open(&path, AccessMode::Read, &reopen).expect("open");
    for y in [5u32, 0, 9, 3, 8] {
        let n = order.iter().rposition(|&o| o == y).expect("written") as u8;
        assert_eq!(read_rgb(&mut image, y), vec![(y as u8, n, 7); 3]);
    }
    assert!(image.read_line(height, &mut rgb_line(3, 0, 0, 0)).is_err());
    assert_eq!(image.last_error(), ErrorCode::InvalidParameter);
}

#[test]
fn buffer_cap_limits_window() {
    let dir = tempdir().expect("tempdir");
    // 10 pixels * 3 bytes = 30 bytes per line; 100 bytes hold 3 lines.
    let config = EngineConfig::host().with_window_lines(64).with_max_buffer_bytes(100);
    let mut image = create_rgb(&dir.path().join("cap.iif"), 10, 50, &config);
    assert_eq!(image.window_lines().expect("lines"), 3);

    assert_eq!(image.set_window_lines(20).expect("resize"), 20);
    assert_eq!(image.window_lines().expect("lines"), 20);
    image.close().expect("close");
}

#[test]
fn update_flush_leaves_untouched_lines_identical() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("dirty.iif");
    let config = EngineConfig::host();

    let mut image = create_rgb(&path, 2, 6, &config);
    for y in 0..6 {
        image.write_line(y, &rgb_line(2, y as u8 + 1, 0, 0)).expect("write");
    }
    image.close().expect("close");
    let before = std::fs::read(&path).expect("read");

    let mut image = ImageFile::open(&path, AccessMode::Update, &config).expect("open");
    read_rgb(&mut image, 1);
    image.write_pixels(4, 1, 1, &rgb_line(1, 99, 99, 99)).expect("write pixel");
    assert_eq!(image.flush().expect("flush"), 1);
    assert_eq!(image.flush().expect("flush"), 0);
    image.close().expect("close");

    let after = std::fs::read(&path).expect("read");
    assert_eq!(before.len(), after.len());
    let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
    // Line 4 starts at 1024 + 4 * 6; pixel 1 covers its last three bytes.
    assert_eq!(changed, [1024 + 27, 1024 + 28, 1024 + 29]);
}

#[test]
fn float_components_roundtrip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("depth.iif");
    let config = EngineConfig::host();

    let spec = ImageSpec::new(
        3,
        1,
        vec![
            Component::new("Z", ComponentType::Float),
            Component::new("N", ComponentType::Short),
            Component::new("W", ComponentType::Double),
        ],
    );
    let mut image = ImageFile::create(&path, &spec, &config).expect("create");
    let line = vec![
        ComponentBuffer::Float(vec![0.25, -1.5, 3.75]),
        ComponentBuffer::Short(vec![-3, 0, 300]),
        ComponentBuffer::Double(vec![1e-9, 2.5, -7.125]),
    ];
    image.write_line(0, &line).expect("write");
    image.close().expect("close");

    let mut image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(
        image.system_var("IIF_Types").expect("system var").and_then(|r| r.as_text()),
        Some("fsd")
    );
    let mut read = ComponentBuffer::for_table(image.components().expect("components"), 3);
    image.read_line(0, &mut read).expect("read");
    for i in 0..3 {
        assert_relative_eq!(
            read[0].get_f64(i).expect("z"),
            line[0].get_f64(i).expect("z")
        );
        assert_relative_eq!(
            read[2].get_f64(i).expect("w"),
            line[2].get_f64(i).expect("w")
        );
    }
    assert_eq!(read[1], line[1]);
}

#[test]
fn foreign_byte_order_file_roundtrips() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("foreign.iif");
    let writer = EngineConfig::host().with_byte_order(Endianness::native().flip());

    let spec = ImageSpec::new(2, 1, vec![Component::new("V", ComponentType::Long)]);
    let mut image = ImageFile::create(&path, &spec, &writer).expect("create");
    image
        .write_line(0, &[ComponentBuffer::Long(vec![0x0102_0304, -2])])
        .expect("write");
    image.close().expect("close");

    let bytes = std::fs::read(&path).expect("read");
    let mut expected = 0x0102_0304i32.to_ne_bytes();
    expected.reverse();
    assert_eq!(&bytes[1024..1028], &expected);

    let mut image = ImageFile::open(&path, AccessMode::Read, &EngineConfig::host()).expect("open");
    assert_eq!(image.header().expect("header").byte_order, Endianness::native().flip());
    let mut read = vec![ComponentBuffer::Long(vec![0; 2])];
    image.read_line(0, &mut read).expect("read");
    assert_eq!(read[0], ComponentBuffer::Long(vec![0x0102_0304, -2]));
}

#[test]
fn partial_reads_and_whole_line_sentinel() {
    let dir = tempdir().expect("tempdir");
    let config = EngineConfig::host();
    let mut image = create_rgb(&dir.path().join("p.iif"), 5, 1, &config);

    image.write_pixels(0, 2, 2, &rgb_line(2, 1, 2, 3)).expect("write");
    let mut part = rgb_line(2, 0, 0, 0);
    assert_eq!(image.read_pixels(0, 1, 2, &mut part).expect("read"), 2);
    assert_eq!(part[0], ComponentBuffer::Byte(vec![0, 1]));

    // The sentinel ignores the count and covers the line.
    let mut whole = rgb_line(5, 0, 0, 0);
    assert_eq!(image.read_pixels(0, WHOLE_LINE, 1, &mut whole).expect("read"), 5);
    assert_eq!(whole[2], ComponentBuffer::Byte(vec![0, 0, 3, 3, 0]));

    assert!(image.read_pixels(0, 4, 2, &mut part).is_err());
    image.close().expect("close");
}

#[test]
fn text_and_binary_variables_persist() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("vars.iif");
    let config = EngineConfig::host().with_platform_name("unit-test");

    let mut image = create_rgb(&path, 1, 1, &config);
    image.put_text_var("Author", "someone").expect("put");
    image.put_binary_var("Thumb", &[0, 1, 2, 255]).expect("put");
    image.close().expect("close");

    let image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    let names: Vec<_> = image.user_vars().expect("user vars").map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["Author", "Thumb"]);
    assert_eq!(image.get_text_var("Author").expect("get"), ("someone".to_string(), None));
    assert_eq!(image.get_binary_var("Thumb").expect("get"), (vec![0, 1, 2, 255], None));
    assert_eq!(
        image.system_var("IIF_Platform").expect("system var").and_then(|r| r.as_text()),
        Some("unit-test")
    );
    assert!(image.system_var("IIF_Width").expect("system var").is_none());
}
