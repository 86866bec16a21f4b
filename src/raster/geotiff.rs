//! GeoTIFF / COG decoder backed by the `tiff` crate over a memory map.
//!
//! Every worker gets its own [`GeoTiffSource`]: its own map, decoder and chunk cache. Nothing
//! here is shared between threads.

use anyhow::{Context, Result, bail};
use log::debug;
use memmap2::Mmap;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::resample::{GeoTransform, SampleWindow, resample_tile};
use super::{Crs, RasterOpener, RasterSource, SourceInfo};
use crate::tiles::mercator::{HALF_EARTH, merc_x_to_lon, merc_y_to_lat};
use crate::utils::config::{RasterConsts, TileConsts};
use crate::{BoundingBox, PixelGrid, TileCoord};

// GeoTIFF tag codes. Looked up through `Tag::from_u16_exhaustive` so they resolve to the
// same variant the decoder stored, named or not.
const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
const MODEL_TIEPOINT_TAG: u16 = 33922;
const MODEL_TRANSFORMATION_TAG: u16 = 34264;
const GEO_KEY_DIRECTORY_TAG: u16 = 34735;
/// GDAL writes the no-data value as ASCII in this private tag.
const GDAL_NODATA_TAG: u16 = 42113;
/// NewSubfileType bit marking a transparency mask IFD.
const SUBFILE_MASK: u32 = 4;

// GeoKey ids and values we care about.
const GT_MODEL_TYPE_KEY: u16 = 1024;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const EPSG_WGS84: u16 = 4326;
const EPSG_WEB_MERCATOR: u16 = 3857;
const WEB_MERCATOR_ALIASES: [u16; 2] = [3785, 3857];

fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Opens [`GeoTiffSource`] handles for one file.
#[derive(Clone, Debug)]
pub struct GeoTiffOpener {
    path: PathBuf,
}

impl GeoTiffOpener {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterOpener for GeoTiffOpener {
    type Source = GeoTiffSource;

    fn describe(&self) -> Result<SourceInfo> {
        let source = GeoTiffSource::open(&self.path)?;
        Ok(source.info())
    }

    fn open(&self) -> Result<GeoTiffSource> {
        GeoTiffSource::open(&self.path)
    }
}

/// One resolution level (full image or an overview IFD).
#[derive(Clone, Debug)]
struct Level {
    ifd_index: usize,
    width: u32,
    height: u32,
    chunk_width: u32,
    chunk_height: u32,
    chunks_across: u32,
    samples_per_pixel: usize,
    transform: GeoTransform,
}

/// Decoded band-1 samples of one chunk.
struct Chunk {
    stride: usize,
    samples: Vec<f32>,
}

/// Decoder plus bounded FIFO cache of decoded chunks, keyed by `(ifd, chunk)`.
struct TiffReader {
    decoder: Decoder<Cursor<Mmap>>,
    current_ifd: usize,
    cache: HashMap<(usize, u32), Chunk>,
    order: VecDeque<(usize, u32)>,
}

impl TiffReader {
    fn select_ifd(&mut self, ifd_index: usize) -> Result<()> {
        if self.current_ifd != ifd_index {
            self.decoder
                .seek_to_image(ifd_index)
                .with_context(|| format!("seek to IFD {ifd_index}"))?;
            self.current_ifd = ifd_index;
        }
        Ok(())
    }

    fn sample(&mut self, level: &Level, col: u32, row: u32) -> Result<f32> {
        let cx = col / level.chunk_width;
        let cy = row / level.chunk_height;
        let index = cy * level.chunks_across + cx;
        let key = (level.ifd_index, index);
        if !self.cache.contains_key(&key) {
            let chunk = self.decode_chunk(level, index)?;
            if self.order.len() >= RasterConsts::CHUNK_CACHE_CAPACITY
                && let Some(old) = self.order.pop_front()
            {
                self.cache.remove(&old);
            }
            self.order.push_back(key);
            self.cache.insert(key, chunk);
        }
        let chunk = &self.cache[&key];
        let local_col = (col - cx * level.chunk_width) as usize;
        let local_row = (row - cy * level.chunk_height) as usize;
        chunk
            .samples
            .get(local_row * chunk.stride + local_col)
            .copied()
            .with_context(|| format!("sample ({col}, {row}) missing from chunk {index}"))
    }

    fn decode_chunk(&mut self, level: &Level, index: u32) -> Result<Chunk> {
        self.select_ifd(level.ifd_index)?;
        let (data_w, data_h) = self.decoder.chunk_data_dimensions(index);
        let decoded = self
            .decoder
            .read_chunk(index)
            .with_context(|| format!("decode chunk {index} of IFD {}", level.ifd_index))?;
        let samples = band_one(decoded, level.samples_per_pixel)?;
        let padded = level.chunk_width as usize * level.chunk_height as usize;
        let stride = if samples.len() >= padded && data_w != level.chunk_width {
            level.chunk_width as usize
        } else {
            data_w as usize
        };
        if samples.len() < stride * data_h as usize {
            bail!(
                "chunk {index} decoded to {} samples, expected at least {}",
                samples.len(),
                stride * data_h as usize
            );
        }
        Ok(Chunk { stride, samples })
    }
}

/// Band 1 of a decoded chunk as f32, skipping the other interleaved samples.
fn band_one(decoded: DecodingResult, samples_per_pixel: usize) -> Result<Vec<f32>> {
    let step = samples_per_pixel.max(1);
    macro_rules! take {
        ($v:expr) => {
            $v.iter().step_by(step).map(|&s| s as f32).collect()
        };
    }
    let samples = match decoded {
        DecodingResult::U8(v) => take!(v),
        DecodingResult::U16(v) => take!(v),
        DecodingResult::U32(v) => take!(v),
        DecodingResult::U64(v) => take!(v),
        DecodingResult::I8(v) => take!(v),
        DecodingResult::I16(v) => take!(v),
        DecodingResult::I32(v) => take!(v),
        DecodingResult::I64(v) => take!(v),
        DecodingResult::F32(v) => take!(v),
        DecodingResult::F64(v) => take!(v),
        #[allow(unreachable_patterns)]
        _ => bail!("unsupported sample format"),
    };
    Ok(samples)
}

/// Per-worker GeoTIFF handle.
pub struct GeoTiffSource {
    reader: TiffReader,
    levels: Vec<Level>,
    crs: Crs,
    nodata: f32,
}

/// Borrowed view of one level, fed to the resampler.
struct LevelWindow<'a> {
    reader: &'a mut TiffReader,
    level: &'a Level,
}

impl SampleWindow for LevelWindow<'_> {
    fn width(&self) -> u32 {
        self.level.width
    }

    fn height(&self) -> u32 {
        self.level.height
    }

    fn sample(&mut self, col: u32, row: u32) -> Result<f32> {
        self.reader.sample(self.level, col, row)
    }
}

impl GeoTiffSource {
    /// Map the file and read georeferencing, CRS, no-data and the overview pyramid.
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("open source raster {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("memory-map source raster {}", path.display()))?;
        // The first IFD is parsed under the default limits; the rest use `unlimited`.
        let mut decoder = Decoder::new(Cursor::new(mmap))
            .with_context(|| format!("read TIFF header of {}", path.display()))?
            .with_limits(Limits::unlimited());

        if decoder
            .find_tag(geo_tag(MODEL_TRANSFORMATION_TAG))
            .unwrap_or(None)
            .is_some()
            && decoder
                .find_tag(geo_tag(MODEL_PIXEL_SCALE_TAG))
                .unwrap_or(None)
                .is_none()
        {
            bail!(
                "{}: rotated/sheared rasters (ModelTransformation) are not supported",
                path.display()
            );
        }
        let scale = decoder
            .get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE_TAG))
            .with_context(|| format!("{}: missing ModelPixelScale tag", path.display()))?;
        let tiepoint = decoder
            .get_tag_f64_vec(geo_tag(MODEL_TIEPOINT_TAG))
            .with_context(|| format!("{}: missing ModelTiepoint tag", path.display()))?;
        let transform = GeoTransform::from_geotiff_tags(&scale, &tiepoint)?;

        let geokeys = decoder.get_tag_u16_vec(geo_tag(GEO_KEY_DIRECTORY_TAG)).ok();
        let crs = match geokeys {
            Some(keys) => crs_from_geokeys(&keys)?,
            None => guess_crs_without_geokeys(&transform, decoder.dimensions()?)?,
        };

        let nodata = decoder
            .get_tag_ascii_string(geo_tag(GDAL_NODATA_TAG))
            .ok()
            .and_then(|s| parse_nodata(&s))
            .unwrap_or(TileConsts::DEFAULT_NODATA);

        let levels = read_levels(&mut decoder, transform)?;
        decoder
            .seek_to_image(levels[0].ifd_index)
            .context("rewind to the full-resolution image")?;
        debug!(
            "{}: {}x{} px, {:?}, nodata {}, {} level(s)",
            path.display(),
            levels[0].width,
            levels[0].height,
            crs,
            nodata,
            levels.len()
        );

        Ok(Self {
            reader: TiffReader {
                decoder,
                current_ifd: levels[0].ifd_index,
                cache: HashMap::new(),
                order: VecDeque::new(),
            },
            levels,
            crs,
            nodata,
        })
    }

    pub fn info(&self) -> SourceInfo {
        let full = &self.levels[0];
        let (min_x, min_y, max_x, max_y) = full.transform.extent(full.width, full.height);
        let bounds = match self.crs {
            Crs::Wgs84 => BoundingBox::new(min_x, min_y, max_x, max_y),
            Crs::WebMercator => BoundingBox::new(
                merc_x_to_lon(min_x),
                merc_y_to_lat(min_y),
                merc_x_to_lon(max_x),
                merc_y_to_lat(max_y),
            ),
        };
        SourceInfo {
            bounds,
            nodata: self.nodata,
            crs: self.crs,
            width: full.width,
            height: full.height,
            levels: self.levels.len(),
        }
    }

    /// Coarsest level whose pixels are still no larger than the tile's output pixels.
    fn level_for(&self, coord: TileCoord, tile_size: u32) -> usize {
        let tiles = (1_u64 << coord.z) as f64 * f64::from(tile_size);
        let wanted = match self.crs {
            Crs::Wgs84 => 360.0 / tiles,
            Crs::WebMercator => 2.0 * HALF_EARTH / tiles,
        };
        self.levels
            .iter()
            .rposition(|l| l.transform.pixel_width <= wanted * (1.0 + 1e-9))
            .unwrap_or(0)
    }
}

impl RasterSource for GeoTiffSource {
    fn nodata(&self) -> f32 {
        self.nodata
    }

    fn read_tile(&mut self, coord: TileCoord, tile_size: u32) -> Result<PixelGrid> {
        let level = &self.levels[self.level_for(coord, tile_size)];
        let mut window = LevelWindow {
            reader: &mut self.reader,
            level,
        };
        resample_tile(
            &mut window,
            &level.transform,
            self.crs,
            coord,
            tile_size,
            self.nodata,
        )
    }
}

/// Walk every IFD, keep full-resolution and reduced-resolution images, skip masks.
/// Levels come back finest first.
fn read_levels(decoder: &mut Decoder<Cursor<Mmap>>, transform: GeoTransform) -> Result<Vec<Level>> {
    let full = decoder.dimensions().context("read image dimensions")?;
    let mut levels = Vec::new();
    let mut ifd_index = 0_usize;
    loop {
        let subfile = decoder.get_tag_u32(Tag::NewSubfileType).unwrap_or(0);
        if subfile & SUBFILE_MASK == 0 {
            let (width, height) = decoder.dimensions()?;
            let (chunk_width, chunk_height) = decoder.chunk_dimensions();
            // Planar images store band 1 in the first plane's chunks: nothing to de-interleave.
            let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1) == 2;
            let samples_per_pixel = if planar {
                1
            } else {
                decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize
            };
            levels.push(Level {
                ifd_index,
                width,
                height,
                chunk_width: chunk_width.max(1),
                chunk_height: chunk_height.max(1),
                chunks_across: width.div_ceil(chunk_width.max(1)),
                samples_per_pixel,
                transform: transform.for_overview(full, (width, height)),
            });
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().context("read next IFD")?;
        ifd_index += 1;
    }
    if levels.is_empty() {
        bail!("no image data found");
    }
    levels.sort_by(|a, b| a.transform.pixel_width.total_cmp(&b.transform.pixel_width));
    Ok(levels)
}

/// Parse the GeoKey directory (`[version, revision, minor, count, (key, loc, count, value)*]`).
pub fn crs_from_geokeys(keys: &[u16]) -> Result<Crs> {
    if keys.len() < 4 {
        bail!("GeoKey directory is truncated");
    }
    let count = keys[3] as usize;
    let mut model_type = None;
    let mut geographic = None;
    let mut projected = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        // Location 0 means the value is stored inline.
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            GT_MODEL_TYPE_KEY => model_type = Some(entry[3]),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(entry[3]),
            PROJECTED_CS_TYPE_KEY => projected = Some(entry[3]),
            _ => {}
        }
    }
    match (model_type, projected, geographic) {
        (_, Some(code), _) if WEB_MERCATOR_ALIASES.contains(&code) => Ok(Crs::WebMercator),
        (Some(MODEL_TYPE_GEOGRAPHIC), _, Some(EPSG_WGS84) | None) => Ok(Crs::Wgs84),
        (None, None, Some(EPSG_WGS84)) => Ok(Crs::Wgs84),
        (Some(MODEL_TYPE_PROJECTED), code, _) => bail!(
            "Unsupported projected CRS EPSG:{}; reproject the source to EPSG:{} or EPSG:{}",
            code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
            EPSG_WGS84,
            EPSG_WEB_MERCATOR
        ),
        (_, _, code) => bail!(
            "Unsupported geographic CRS EPSG:{}; only EPSG:{} is supported",
            code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
            EPSG_WGS84
        ),
    }
}

/// No GeoKeys at all: accept only extents that can only be lon/lat degrees.
fn guess_crs_without_geokeys(transform: &GeoTransform, dims: (u32, u32)) -> Result<Crs> {
    let (min_x, min_y, max_x, max_y) = transform.extent(dims.0, dims.1);
    if min_x >= -180.0 - 1e-6 && max_x <= 180.0 + 1e-6 && min_y >= -90.0 - 1e-6 && max_y <= 90.0 + 1e-6
    {
        log::warn!("No GeoKey directory; assuming EPSG:{EPSG_WGS84} from the extent");
        return Ok(Crs::Wgs84);
    }
    bail!("No GeoKey directory and the extent is not lon/lat; cannot determine the CRS")
}

/// GDAL stores no-data as ASCII, sometimes NUL-terminated or padded.
pub fn parse_nodata(raw: &str) -> Option<f32> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match trimmed.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f32::NAN),
        other => other.parse::<f32>().ok(),
    }
}
