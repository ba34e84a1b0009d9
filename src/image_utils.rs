//! Conversions between `image` buffers and `ndarray` arrays
//!
//! The pipeline works on arrays with axis order `(y, x)`; `image` buffers
//! index as `(x, y)`. These helpers bridge the two for callers that load
//! frames with the `image` crate.

use image::GrayImage;
use ndarray::{Array2, ArrayD, ArrayView2};

/// Copy an 8-bit grayscale image into a `(height, width)` array.
pub fn gray_image_to_array(img: &GrayImage) -> Array2<u8> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0]
    })
}

/// Copy an 8-bit grayscale image into a dynamic-dimensional array, ready
/// for [`crate::locate`].
pub fn gray_image_to_dyn(img: &GrayImage) -> ArrayD<u8> {
    gray_image_to_array(img).into_dyn()
}

/// Copy a `(height, width)` array back into an 8-bit grayscale image.
pub fn array_to_gray_image(array: ArrayView2<u8>) -> GrayImage {
    let (height, width) = (array.nrows(), array.ncols());
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        image::Luma([array[[y as usize, x as usize]]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_round_trips() {
        let mut img = GrayImage::new(4, 3);
        img.put_pixel(2, 1, image::Luma([200]));
        img.put_pixel(0, 2, image::Luma([17]));

        let array = gray_image_to_array(&img);
        assert_eq!(array.dim(), (3, 4));
        assert_eq!(array[[1, 2]], 200);
        assert_eq!(array[[2, 0]], 17);

        let back = array_to_gray_image(array.view());
        assert_eq!(back, img);
    }
}
