use iiff_io::{
    AccessMode, Component, ComponentBuffer, ComponentType, EngineConfig, ErrorCode, Format, ImageFile, ImageSpec,
    VarKind,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Hand-built version 1 file: 2x1 RGB, little-endian marker, text variables.
fn legacy_file(path: &Path, vars_block: &[u8]) {
    let mut bytes = vec![0u8; 1024];
    bytes[0..4].copy_from_slice(b"IIFI");
    bytes[4] = 1;
    bytes[5] = 3;
    bytes[20..24].copy_from_slice(b"0002");
    bytes[24..28].copy_from_slice(b"0001");
    bytes[28..33].copy_from_slice(b"R,G,B");
    bytes[142..145].copy_from_slice(&[8, 8, 8]);
    bytes[256..263].copy_from_slice(b"old.iif");
    bytes[512..512 + vars_block.len()].copy_from_slice(vars_block);
    bytes[768..772].copy_from_slice(b"0000");
    bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
    fs::write(path, bytes).expect("write legacy file");
}

#[test]
fn legacy_file_loads_and_upgrades() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("old.iif");
    legacy_file(&path, b"IIF_Platform=irix\0IIF_Types=bbb\0\0");
    let config = EngineConfig::host();

    let mut image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    let header = image.header().expect("header");
    assert_eq!(header.version, 1);
    assert_eq!(header.filename, "old.iif");
    assert!(!header.swap_enabled);
    assert_eq!(
        image.system_var("IIF_Platform").expect("system var").and_then(|r| r.as_text()),
        Some("irix")
    );

    let mut line = ComponentBuffer::for_table(image.components().expect("components"), 2);
    image.read_line(0, &mut line).expect("read");
    assert_eq!(line[0], ComponentBuffer::Byte(vec![1, 4]));
    assert_eq!(line[2], ComponentBuffer::Byte(vec![3, 6]));
    image.close().expect("close");

    let mut image = ImageFile::open(&path, AccessMode::Update, &config).expect("update");
    image.put_text_var("Note", "converted").expect("put");
    image.close().expect("close");

    let image = ImageFile::open(&path, AccessMode::Read, &config).expect("reopen");
    assert_eq!(image.header().expect("header").version, 2);
    assert_eq!(image.get_text_var("Note").expect("get").0, "converted");
    assert_eq!(
        image.system_var("IIF_Types").expect("system var").and_then(|r| r.as_text()),
        Some("bbb")
    );
}

#[test]
fn legacy_file_with_unknown_variable_is_too_old() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("older.iif");
    legacy_file(&path, b"Author=me\0\0");

    let err = ImageFile::open(&path, AccessMode::Read, &EngineConfig::host()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OldVersion);
}

#[test]
fn legacy_file_without_types_infers_from_sizes() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("untyped.iif");
    legacy_file(&path, b"\0");

    let image = ImageFile::open(&path, AccessMode::Read, &EngineConfig::host()).expect("open");
    let types: Vec<_> = image.components().expect("components").iter().map(|c| c.ty).collect();
    assert_eq!(types, [ComponentType::Byte; 3]);
}

#[test]
fn many_variables_continue_after_pixel_data() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mvm.iif");
    let config = EngineConfig::host();
    let spec = ImageSpec::parse_components(4, 3, "R:byte,G:byte,B:byte").expect("spec");
    let data_end = 1024 + 3 * 12;

    let mut image = ImageFile::create(&path, &spec, &config).expect("create");
    for i in 0..40 {
        if i % 2 == 0 {
            image
                .put_text_var(&format!("note{:02}", i), &format!("value number {}", i))
                .expect("put text");
        } else {
            image
                .put_binary_var(&format!("blob{:02}", i), &[i as u8; 17])
                .expect("put binary");
        }
    }
    let blank = ComponentBuffer::for_table(image.components().expect("components"), 4);
    image.write_line(2, &blank).expect("write");
    image.close().expect("close");

    let bytes = fs::read(&path).expect("read");
    assert!(bytes.len() > data_end);
    // The more-variables marker sits inside the header area.
    assert!(bytes[512..768].contains(&0xFF));

    let image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    let records: Vec<_> = image.user_vars().expect("user vars").collect();
    assert_eq!(records.len(), 40);
    for (i, record) in records.iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!(record.name, format!("note{:02}", i));
            assert_eq!(record.kind, VarKind::Text);
            assert_eq!(record.value, format!("value number {}", i).into_bytes());
        } else {
            assert_eq!(record.name, format!("blob{:02}", i));
            assert_eq!(record.kind, VarKind::Binary);
            assert_eq!(record.value, vec![i as u8; 17]);
        }
    }
    assert_eq!(image.variables_offset().expect("offset"), bytes.len() as u64);
    drop(image);

    // Removing the overflow shrinks the file back to the pixel data.
    let mut image = ImageFile::open(&path, AccessMode::Update, &config).expect("update");
    for i in 1..40 {
        let name = if i % 2 == 0 { format!("note{:02}", i) } else { format!("blob{:02}", i) };
        image.remove_var(&name).expect("remove");
    }
    image.close().expect("close");
    assert_eq!(fs::metadata(&path).expect("metadata").len(), data_end as u64);

    let image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(image.user_vars().expect("user vars").count(), 1);
}

#[test]
fn wide_image_uses_resolution_overflow() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("wide.iif");
    let config = EngineConfig::host();
    let width = 70_000u32;

    let spec = ImageSpec::new(width, 2, vec![Component::new("Y", ComponentType::Byte)]);
    let mut image = ImageFile::create(&path, &spec, &config).expect("create");
    let mut line = vec![0u8; width as usize];
    line[width as usize - 1] = 42;
    image.write_line(1, &[ComponentBuffer::Byte(line)]).expect("write");
    image.close().expect("close");

    let bytes = fs::read(&path).expect("read");
    assert_eq!(&bytes[20..24], b"FFFF");
    assert_eq!(&bytes[24..28], b"0002");

    let mut image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(image.resolution().expect("resolution"), (width, 2));
    assert_eq!(
        image.system_var("IIF_Width").expect("system var").and_then(|r| r.as_text()),
        Some("00011170")
    );
    let mut read = vec![ComponentBuffer::Byte(vec![0; width as usize])];
    image.read_pixels(1, width as i64 - 2, 2, &mut read).expect("read");
    assert_eq!(read[0].get_f64(1), Some(42.0));
}

#[test]
fn tall_image_continues_variables_after_overflowed_height() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tall.iif");
    let config = EngineConfig::host();
    let height = 70_000u32;

    let spec = ImageSpec::new(1, height, vec![Component::new("Y", ComponentType::Byte)]);
    let mut image = ImageFile::create(&path, &spec, &config).expect("create");
    image
        .write_line(height - 1, &[ComponentBuffer::Byte(vec![9])])
        .expect("write");
    for i in 0..30u8 {
        image
            .put_binary_var(&format!("tag{:02}", i), &[i; 30])
            .expect("put");
    }
    image.close().expect("close");

    let bytes = fs::read(&path).expect("read");
    assert_eq!(&bytes[20..24], b"0001");
    assert_eq!(&bytes[24..28], b"FFFF");
    let data_end = 1024 + height as usize;
    assert!(bytes.len() > data_end);
    assert_eq!(bytes[data_end - 1], 9);

    let mut image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(image.resolution().expect("resolution"), (1, height));
    assert_eq!(
        image.system_var("IIF_Height").expect("system var").and_then(|r| r.as_text()),
        Some("00011170")
    );
    let records: Vec<_> = image.user_vars().expect("user vars").cloned().collect();
    assert_eq!(records.len(), 30);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.name, format!("tag{:02}", i));
        assert_eq!(record.kind, VarKind::Binary);
        assert_eq!(record.value, vec![i as u8; 30]);
    }
    assert_eq!(image.variables_offset().expect("offset"), bytes.len() as u64);

    let mut read = vec![ComponentBuffer::Byte(vec![0])];
    image.read_line(height - 1, &mut read).expect("read");
    assert_eq!(read[0], ComponentBuffer::Byte(vec![9]));
}

#[test]
fn component_count_is_bounded_by_type_record() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("many.iif");
    let config = EngineConfig::host();
    let limit = iiff_io::layout::MAX_COMPONENTS;
    let table = |n: usize| -> Vec<Component> {
        (0..n).map(|i| Component::new(format!("c{}", i), ComponentType::Byte)).collect()
    };

    let image = ImageFile::create(&path, &ImageSpec::new(1, 1, table(limit)), &config).expect("create");
    image.close().expect("close");

    let image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(image.components().expect("components").len(), limit);
    let types = image
        .system_var("IIF_Types")
        .expect("system var")
        .and_then(|r| r.as_text())
        .map(str::len);
    assert_eq!(types, Some(limit));
    image.close().expect("close");

    let err = ImageFile::create(&path, &ImageSpec::new(1, 1, table(limit + 1)), &config).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadComponent);

    let mut image = ImageFile::open(&path, AccessMode::Write, &config).expect("open");
    let err = image.define_components(table(limit + 1)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadComponent);
    assert!(image.initialize().is_err());
}

#[test]
fn large_component_table_uses_computed_layout() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("wide_table.iif");
    let config = EngineConfig::host();

    let components: Vec<_> = (0..130)
        .map(|i| Component::new(format!("channel_{:03}", i), ComponentType::Short))
        .collect();
    let spec = ImageSpec::new(2, 2, components.clone());
    let mut image = ImageFile::create(&path, &spec, &config).expect("create");
    let layout = image.header().expect("header").layout;
    assert!(layout.computed);
    assert!(layout.header_size() > 1024);

    let mut line = ComponentBuffer::for_table(image.components().expect("components"), 2);
    line[129] = ComponentBuffer::Short(vec![-5, 5]);
    image.write_line(1, &line).expect("write");
    image.close().expect("close");

    let bytes = fs::read(&path).expect("read");
    assert_eq!(&bytes[6..8], b"EX");
    assert_eq!(&bytes[12..16], b"0082");

    let mut image = ImageFile::open(&path, AccessMode::Read, &config).expect("open");
    assert_eq!(image.header().expect("header").layout, layout);
    let names: Vec<_> = image.components().expect("components").iter().cloned().collect();
    assert_eq!(names, components);

    let mut read = ComponentBuffer::for_table(image.components().expect("components"), 2);
    image.read_line(1, &mut read).expect("read");
    assert_eq!(read[129], ComponentBuffer::Short(vec![-5, 5]));
}

#[test]
fn foreign_formats_are_detected_not_served() {
    let dir = tempdir().expect("tempdir");
    let config = EngineConfig::host();

    let tiff = dir.path().join("a.tif");
    fs::write(&tiff, [0x49, 0x49, 0x2A, 0x00, 8, 0, 0, 0]).expect("write");
    let gif = dir.path().join("b.gif");
    fs::write(&gif, b"GIF89a....").expect("write");
    let junk = dir.path().join("c.bin");
    fs::write(&junk, b"nothing here").expect("write");

    assert_eq!(Format::detect(&tiff).expect("detect"), Format::Tiff);
    assert_eq!(Format::detect(&gif).expect("detect"), Format::Gif);
    assert_eq!(Format::detect(&junk).expect("detect"), Format::Unknown);

    let image = ImageFile::open(&tiff, AccessMode::Read, &config).expect("open tiff");
    assert_eq!(image.format(), Format::Tiff);
    let err = image.resolution().unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
    assert_eq!(image.last_error(), ErrorCode::UnsupportedFormat);
    assert!(image.get_text_var("x").is_err());
    image.close().expect("close");

    let err = ImageFile::open(&gif, AccessMode::Update, &config).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
    let err = ImageFile::open(&junk, AccessMode::Read, &config).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFormat);
}

#[test]
fn truncated_file_reports_eof() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("short.iif");
    fs::write(&path, b"IIFM\x02\x03").expect("write");

    let err = ImageFile::open(&path, AccessMode::Read, &EngineConfig::host()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnexpectedEof);
}

#[test]
fn missing_file_is_a_disk_error() {
    let dir = tempdir().expect("tempdir");
    let err = ImageFile::open(dir.path().join("none.iif"), AccessMode::Read, &EngineConfig::host()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadDisk);
}
