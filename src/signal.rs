//! Cube signals: six square RGBA textures, one per axis-aligned cube face.

use crate::errors::ValidationError;
use crate::float_types::Real;
use nalgebra::Vector3;

/// One 8-bit RGBA pixel, straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Rgba { r, g, b, a }
    }

    /// Parse eight hex digits laid out as `RRGGBBAA`.
    pub fn from_hex(digits: &str) -> Option<Self> {
        if digits.len() != 8 || !digits.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Rgba::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?))
    }

    /// A fully transparent pixel carries no signal.
    pub const fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Mean of the colour channels over 127.5, so neutral grey is ~1.0 and white is 2.0.
    pub fn strength(&self) -> Real {
        (self.r as Real + self.g as Real + self.b as Real) / 3.0 / 127.5
    }

    /// Colour channels scaled to `[0, 1]`.
    pub fn to_unit_rgb(&self) -> [Real; 3] {
        [
            self.r as Real / 255.0,
            self.g as Real / 255.0,
            self.b as Real / 255.0,
        ]
    }

    /// Source-over compositing of `self` on top of `dst`.
    pub fn over(self, dst: Rgba) -> Rgba {
        let sa = self.a as u32;
        let da = dst.a as u32;
        // alpha scaled by 255
        let out = sa * 255 + da * (255 - sa);
        if out == 0 {
            return Rgba::TRANSPARENT;
        }
        let mix = |s: u8, d: u8| -> u8 {
            let num = s as u32 * sa * 255 + d as u32 * da * (255 - sa);
            ((num + out / 2) / out) as u8
        };
        Rgba {
            r: mix(self.r, dst.r),
            g: mix(self.g, dst.g),
            b: mix(self.b, dst.b),
            a: ((out + 127) / 255) as u8,
        }
    }
}

/// Axis-aligned cube faces, in cube-map order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Position of this face in cube-map order.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short tag (`px`, `nx`, ...).
    pub const fn tag(self) -> &'static str {
        match self {
            CubeFace::PosX => "px",
            CubeFace::NegX => "nx",
            CubeFace::PosY => "py",
            CubeFace::NegY => "ny",
            CubeFace::PosZ => "pz",
            CubeFace::NegZ => "nz",
        }
    }

    /// Outward unit normal.
    pub fn normal(self) -> Vector3<Real> {
        match self {
            CubeFace::PosX => Vector3::x(),
            CubeFace::NegX => -Vector3::x(),
            CubeFace::PosY => Vector3::y(),
            CubeFace::NegY => -Vector3::y(),
            CubeFace::PosZ => Vector3::z(),
            CubeFace::NegZ => -Vector3::z(),
        }
    }

    /// Find the face named inside `name`, e.g. a file name like `sky_posx.png` or `Left.jpg`.
    ///
    /// Long aliases are tried before the two-letter tags so `posx` is never read as `px`.
    pub fn from_name(name: &str) -> Option<CubeFace> {
        const LONG: [(&str, &str, CubeFace); 6] = [
            ("posx", "right", CubeFace::PosX),
            ("negx", "left", CubeFace::NegX),
            ("posy", "top", CubeFace::PosY),
            ("negy", "bottom", CubeFace::NegY),
            ("posz", "front", CubeFace::PosZ),
            ("negz", "back", CubeFace::NegZ),
        ];
        let name = name.to_ascii_lowercase();
        LONG.iter()
            .find(|(a, b, _)| name.contains(a) || name.contains(b))
            .map(|(_, _, face)| *face)
            .or_else(|| {
                CubeFace::ALL
                    .into_iter()
                    .find(|face| name.contains(face.tag()))
            })
    }
}

/// A square grid of pixels, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceTexture {
    size: usize,
    pixels: Vec<Rgba>,
}

impl FaceTexture {
    /// A fully transparent `size × size` texture.
    pub fn new(size: usize) -> Self {
        Self::filled(size, Rgba::TRANSPARENT)
    }

    /// A `size × size` texture of one colour.
    pub fn filled(size: usize, color: Rgba) -> Self {
        FaceTexture {
            size,
            pixels: vec![color; size * size],
        }
    }

    /// Wrap a row-major pixel buffer, which must describe a square.
    pub fn from_pixels(pixels: Vec<Rgba>) -> Result<Self, ValidationError> {
        let size = (pixels.len() as f64).sqrt().round() as usize;
        if size == 0 || size * size != pixels.len() {
            return Err(ValidationError::NonSquareFace(pixels.len()));
        }
        Ok(FaceTexture { size, pixels })
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> Rgba {
        self.pixels[y * self.size + x]
    }

    pub fn set(&mut self, x: usize, y: usize, color: Rgba) {
        self.pixels[y * self.size + x] = color;
    }

    /// Pixel under texture coordinate `(u, v)`, read at `(u, 1 − v)` and clamped to the edge.
    pub fn sample_uv(&self, u: Real, v: Real) -> Rgba {
        let last = self.size.saturating_sub(1);
        let texel = |t: Real| ((t * self.size as Real).floor().max(0.0) as usize).min(last);
        self.get(texel(u), texel(1.0 - v))
    }

    /// Composite `color` over the rectangle at `(x, y)` of `w × h`, clipped to the texture.
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: Rgba) {
        let x_end = (x + w).min(self.size);
        let y_end = (y + h).min(self.size);
        for py in y..y_end {
            for px in x..x_end {
                let i = py * self.size + px;
                self.pixels[i] = color.over(self.pixels[i]);
            }
        }
    }

    /// Composite `top` over this texture. Both must be the same size.
    pub fn draw_over(&mut self, top: &FaceTexture) {
        debug_assert_eq!(self.size, top.size);
        for (dst, src) in self.pixels.iter_mut().zip(&top.pixels) {
            *dst = src.over(*dst);
        }
    }

    /// Box-filter this texture down (or nearest-neighbour up) to `level × level`.
    pub fn downsample(&self, level: usize) -> FaceTexture {
        let level = level.max(1);
        if level == self.size {
            return self.clone();
        }
        if level > self.size {
            let mut out = FaceTexture::new(level);
            for y in 0..level {
                for x in 0..level {
                    out.set(x, y, self.get(x * self.size / level, y * self.size / level));
                }
            }
            return out;
        }

        // accumulate every source pixel into the destination pixel covering it
        let mut sums = vec![[0u32; 5]; level * level];
        for y in 0..self.size {
            let dy = y * level / self.size;
            for x in 0..self.size {
                let dx = x * level / self.size;
                let p = self.get(x, y);
                let s = &mut sums[dy * level + dx];
                s[0] += p.r as u32;
                s[1] += p.g as u32;
                s[2] += p.b as u32;
                s[3] += p.a as u32;
                s[4] += 1;
            }
        }
        let pixels = sums
            .into_iter()
            .map(|[r, g, b, a, n]| {
                let avg = |c: u32| ((c + n / 2) / n) as u8;
                Rgba::new(avg(r), avg(g), avg(b), avg(a))
            })
            .collect();
        FaceTexture {
            size: level,
            pixels,
        }
    }
}

/// Six face textures in [`CubeFace::ALL`] order, all the same size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeSignal {
    faces: [FaceTexture; 6],
}

impl CubeSignal {
    /// Build a signal from six textures in cube-map order.
    pub fn from_faces(faces: Vec<FaceTexture>) -> Result<Self, ValidationError> {
        let count = faces.len();
        let faces: [FaceTexture; 6] = faces
            .try_into()
            .map_err(|_| ValidationError::FaceCount(count))?;
        let expected = faces[0].size();
        for (face, tex) in CubeFace::ALL.iter().zip(&faces) {
            if tex.size() != expected || expected == 0 {
                return Err(ValidationError::FaceSize {
                    face: *face,
                    expected,
                    found: tex.size(),
                });
            }
        }
        Ok(CubeSignal { faces })
    }

    /// Build a signal from six textures tagged with names such as file names.
    ///
    /// Each name must resolve through [`CubeFace::from_name`] to a distinct face.
    pub fn from_named_faces(named: Vec<(String, FaceTexture)>) -> Result<Self, ValidationError> {
        if named.len() != 6 {
            return Err(ValidationError::FaceCount(named.len()));
        }
        let mut slots: [Option<FaceTexture>; 6] = Default::default();
        for (name, tex) in named {
            let face = CubeFace::from_name(&name)
                .ok_or_else(|| ValidationError::UnknownFace(name.clone()))?;
            let slot = &mut slots[face.index()];
            if slot.is_some() {
                return Err(ValidationError::UnknownFace(name));
            }
            *slot = Some(tex);
        }
        let faces: Vec<FaceTexture> = slots.into_iter().flatten().collect();
        Self::from_faces(faces)
    }

    /// Six copies of one uniform texture.
    pub fn uniform(size: usize, color: Rgba) -> Self {
        CubeSignal {
            faces: std::array::from_fn(|_| FaceTexture::filled(size, color)),
        }
    }

    /// Edge length shared by all faces.
    pub fn size(&self) -> usize {
        self.faces[0].size()
    }

    pub fn face(&self, face: CubeFace) -> &FaceTexture {
        &self.faces[face.index()]
    }

    pub fn faces(&self) -> &[FaceTexture; 6] {
        &self.faces
    }

    /// Replace one face, keeping the shared size.
    pub fn set_face(&mut self, face: CubeFace, texture: FaceTexture) -> Result<(), ValidationError> {
        if texture.size() != self.size() {
            return Err(ValidationError::FaceSize {
                face,
                expected: self.size(),
                found: texture.size(),
            });
        }
        self.faces[face.index()] = texture;
        Ok(())
    }

    /// Median strength over every non-transparent pixel, or `None` when the signal carries
    /// no opaque pixel at all. Even counts take the upper of the two middle values.
    pub fn neutral_strength(&self) -> Option<Real> {
        let mut strengths: Vec<Real> = self
            .faces
            .iter()
            .flat_map(|face| face.pixels())
            .filter(|p| !p.is_transparent())
            .map(Rgba::strength)
            .collect();
        if strengths.is_empty() {
            return None;
        }
        let mid = strengths.len() / 2;
        let (_, median, _) = strengths.select_nth_unstable_by(mid, Real::total_cmp);
        Some(*median)
    }
}
