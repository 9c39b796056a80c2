//! Synthetic page images.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiny_skia::{Color, Pixmap};

use crate::config::Fill;
use crate::{Error, Result};

/// Generate `count` images of `width` × `height` pixels.
///
/// Every pixel is written and opaque. Noise content differs between images;
/// with a seed the whole sequence is reproducible.
pub fn generate(count: usize, width: u32, height: u32, fill: Fill) -> Result<Vec<Pixmap>> {
    if count == 0 {
        return Err(Error::InvalidInput("image count must be > 0".to_string()));
    }

    let mut rng = match fill {
        Fill::Noise { seed: Some(seed) } => StdRng::seed_from_u64(seed),
        _ => StdRng::from_os_rng(),
    };

    (0..count)
        .map(|_| {
            let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "image dimensions are invalid or too large: {}x{}",
                    width, height
                ))
            })?;

            match fill {
                Fill::Noise { .. } => fill_noise(&mut pixmap, &mut rng),
                Fill::Solid([r, g, b]) => pixmap.fill(Color::from_rgba8(r, g, b, 255)),
            }

            Ok(pixmap)
        })
        .collect()
}

fn fill_noise<R: Rng>(pixmap: &mut Pixmap, rng: &mut R) {
    let data = pixmap.data_mut();
    rng.fill(data);

    // Premultiplied storage, so full alpha keeps any colour value legal.
    for px in data.chunks_exact_mut(4) {
        px[3] = 255;
    }
}
