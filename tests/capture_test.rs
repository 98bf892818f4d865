use gltf_viewer::capture::{FramebufferOrigin, Readback, flip_rows, padded_bytes_per_row};

#[test]
fn rows_are_padded_to_the_copy_alignment() {
    assert_eq!(padded_bytes_per_row(1), 256);
    assert_eq!(padded_bytes_per_row(10), 256);
    assert_eq!(padded_bytes_per_row(64), 256);
    assert_eq!(padded_bytes_per_row(65), 512);
    assert_eq!(padded_bytes_per_row(1280), 5120);
}

#[test]
fn flip_rows_reverses_row_order() {
    let mut pixels = vec![1, 1, 2, 2, 3, 3];
    flip_rows(&mut pixels, 2, 3);
    assert_eq!(pixels, vec![3, 3, 2, 2, 1, 1]);

    let mut even = vec![1, 2, 3, 4];
    flip_rows(&mut even, 1, 4);
    assert_eq!(even, vec![4, 3, 2, 1]);
}

/// A 2x2 readback whose top row is red/green and bottom row blue/white.
fn readback(origin: FramebufferOrigin) -> Readback {
    let pitch = padded_bytes_per_row(2) as usize;
    let mut data = vec![0xAA; pitch * 2];
    data[..8].copy_from_slice(&[255, 0, 0, 255, 0, 255, 0, 255]);
    data[pitch..pitch + 8].copy_from_slice(&[0, 0, 255, 255, 255, 255, 255, 255]);
    Readback {
        width: 2,
        height: 2,
        padded_bytes_per_row: pitch as u32,
        data,
        origin,
    }
}

#[test]
fn rgb_conversion_drops_padding_and_alpha() {
    let image = readback(FramebufferOrigin::TopLeft).to_rgb8().unwrap();
    assert_eq!(image.dimensions(), (2, 2));
    assert_eq!(
        image.into_raw(),
        vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255]
    );
}

#[test]
fn bottom_left_readbacks_are_flipped() {
    let image = readback(FramebufferOrigin::BottomLeft).to_rgb8().unwrap();
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 255]);
    assert_eq!(image.get_pixel(1, 1).0, [0, 255, 0]);
}

#[test]
fn short_readbacks_are_an_error() {
    let mut short = readback(FramebufferOrigin::TopLeft);
    short.data.truncate(short.padded_bytes_per_row as usize);
    assert!(short.to_rgb8().is_err());

    let mut narrow = readback(FramebufferOrigin::TopLeft);
    narrow.padded_bytes_per_row = 4;
    assert!(narrow.to_rgb8().is_err());
}
