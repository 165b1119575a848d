use std::ops::Range;

use thiserror::Error;

use crate::{
    compress::{
        bitpack::{pack16, pack16_bound},
        delta::delta2d_encode,
        quantize::quantize,
        CompressionMode,
    },
    io::{self, OmWriteBackend, WriteBuffer},
    FILE_MAGIC, FORMAT_VERSION, HEADER_SIZE,
};

pub type Result<T> = std::result::Result<T, Error>;

pub const MIN_WRITE_BUFFER_SIZE: usize = 1024 * 1024;
pub const RECOMMENDED_CHUNK_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum Error {
    #[error("dimension mismatch {0}")]
    DimensionMismatch(String),
    #[error("out of range {0}")]
    OutOfRange(String),
    #[error("chunk alignment {0}")]
    ChunkAlignment(String),
    #[error("chunk overflow {0}")]
    ChunkOverflow(String),
    #[error("io error {0}")]
    Io(#[from] io::Error),
    #[error("encoder is not in a state to accept this call")]
    Unusable,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Created,
    HeaderWritten,
    Finished,
    Failed,
}

/// Streaming encoder for one OM file: header, chunk-major data pushes,
/// trailer. Chunks are emitted in strictly increasing chunk-index order and
/// flushed to the backend one at a time.
pub struct OmFileWriter {
    dimensions: Vec<usize>,
    chunk_dimensions: Vec<usize>,
    chunk_counts: Vec<usize>,
    compression: CompressionMode,
    scale_factor: f32,
    chunk_offsets: Vec<u64>,
    chunk_index: usize,
    write_buffer: WriteBuffer,
    chunk_buffer: Vec<i16>,
    state: WriterState,
}

impl OmFileWriter {
    pub fn new(
        dimensions: &[usize],
        chunk_dimensions: &[usize],
        compression: CompressionMode,
        scale_factor: f32,
    ) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(Error::DimensionMismatch(
                "at least one dimension is required".to_string(),
            ));
        }
        if chunk_dimensions.len() != dimensions.len() {
            return Err(Error::DimensionMismatch(format!(
                "got {} chunk extents for {} dimensions",
                chunk_dimensions.len(),
                dimensions.len()
            )));
        }
        for (axis, (&dimension, &chunk)) in dimensions.iter().zip(chunk_dimensions).enumerate() {
            if dimension == 0 || chunk == 0 {
                return Err(Error::OutOfRange(format!(
                    "dimension {} and chunk extent {} on axis {} must be at least 1",
                    dimension, chunk, axis
                )));
            }
        }
        if !scale_factor.is_finite() || scale_factor == 0.0 {
            return Err(Error::OutOfRange(format!(
                "scale factor must be finite and non-zero, got {}",
                scale_factor
            )));
        }

        let chunk_counts: Vec<usize> = dimensions
            .iter()
            .zip(chunk_dimensions)
            .map(|(&dimension, &chunk)| dimension.div_ceil(chunk))
            .collect();
        let n_chunks = chunk_counts.iter().product();
        let elements_per_chunk: usize = chunk_dimensions.iter().product();

        if elements_per_chunk * 4 > RECOMMENDED_CHUNK_BYTES {
            log::warn!(
                "chunk shape {:?} stages {} bytes per chunk, above the recommended {}",
                chunk_dimensions,
                elements_per_chunk * 4,
                RECOMMENDED_CHUNK_BYTES
            );
        }

        let write_buffer_size = pack16_bound(elements_per_chunk).max(MIN_WRITE_BUFFER_SIZE);

        Ok(OmFileWriter {
            dimensions: dimensions.to_vec(),
            chunk_dimensions: chunk_dimensions.to_vec(),
            chunk_counts,
            compression,
            scale_factor,
            chunk_offsets: vec![0; n_chunks],
            chunk_index: 0,
            write_buffer: WriteBuffer::new(write_buffer_size),
            chunk_buffer: vec![0; elements_per_chunk],
            state: WriterState::Created,
        })
    }

    pub fn bytes_written(&self) -> usize {
        self.write_buffer.total_bytes_written()
    }

    pub fn chunks_written(&self) -> usize {
        self.chunk_index
    }

    pub fn n_chunks(&self) -> usize {
        self.chunk_offsets.len()
    }

    pub fn write_header<B: OmWriteBackend>(&mut self, backend: &mut B) -> Result<()> {
        if self.state != WriterState::Created {
            return Err(Error::Unusable);
        }
        let result = self.emit_header(backend);
        self.transition(&result, WriterState::HeaderWritten);
        result
    }

    /// Pushes one slab of source data. The slab must cover whole chunks of
    /// the file grid (trailing partial chunks included), supplied in
    /// chunk-major order across calls.
    pub fn write_data<B: OmWriteBackend>(
        &mut self,
        array: &[f32],
        array_dimensions: &[usize],
        array_read: &[Range<usize>],
        backend: &mut B,
    ) -> Result<()> {
        if self.state != WriterState::HeaderWritten {
            return Err(Error::Unusable);
        }
        self.validate_slab(array, array_dimensions, array_read)?;

        let call_counts: Vec<usize> = array_read
            .iter()
            .zip(&self.chunk_dimensions)
            .map(|(range, &chunk)| (range.end - range.start).div_ceil(chunk))
            .collect();
        let n_call_chunks: usize = call_counts.iter().product();
        if self.chunk_index + n_call_chunks > self.chunk_offsets.len() {
            return Err(Error::ChunkOverflow(format!(
                "slab supplies {} chunks but only {} of {} remain",
                n_call_chunks,
                self.chunk_offsets.len() - self.chunk_index,
                self.chunk_offsets.len()
            )));
        }

        let result = self.emit_slab(array, array_dimensions, array_read, &call_counts, backend);
        self.transition(&result, WriterState::HeaderWritten);
        result
    }

    /// Single-call write of a full array shaped like the file itself.
    pub fn write_all<B: OmWriteBackend>(&mut self, array: &[f32], backend: &mut B) -> Result<()> {
        let array_dimensions = self.dimensions.clone();
        let array_read: Vec<Range<usize>> =
            array_dimensions.iter().map(|&extent| 0..extent).collect();
        self.write_data(array, &array_dimensions, &array_read, backend)
    }

    pub fn write_trailer<B: OmWriteBackend>(&mut self, backend: &mut B) -> Result<()> {
        if self.state != WriterState::HeaderWritten {
            return Err(Error::Unusable);
        }
        let result = self.emit_trailer(backend);
        self.transition(&result, WriterState::Finished);
        result
    }

    /// Sink and staging-buffer failures poison the encoder; validation
    /// errors leave it usable for a corrected retry.
    fn transition<T>(&mut self, result: &Result<T>, on_success: WriterState) {
        if matches!(result, Err(Error::Io(_))) {
            self.state = WriterState::Failed;
        } else if result.is_ok() {
            self.state = on_success;
        }
    }

    fn emit_header<B: OmWriteBackend>(&mut self, backend: &mut B) -> Result<()> {
        let header = [FILE_MAGIC[0], FILE_MAGIC[1], FORMAT_VERSION];
        self.write_buffer.push_bytes(&header)?;
        self.write_buffer.flush(backend)?;
        Ok(())
    }

    fn emit_slab<B: OmWriteBackend>(
        &mut self,
        array: &[f32],
        array_dimensions: &[usize],
        array_read: &[Range<usize>],
        call_counts: &[usize],
        backend: &mut B,
    ) -> Result<()> {
        let n_call_chunks: usize = call_counts.iter().product();
        for c_offset in 0..n_call_chunks {
            self.write_next_chunk(array, array_dimensions, array_read, call_counts, c_offset)?;
            self.write_buffer.flush(backend)?;
        }
        Ok(())
    }

    fn emit_trailer<B: OmWriteBackend>(&mut self, backend: &mut B) -> Result<()> {
        let lut_start = (self.write_buffer.total_bytes_written() - HEADER_SIZE) as i64;

        for i in 0..self.chunk_offsets.len() {
            let offset = self.chunk_offsets[i] as i64;
            self.write_buffer.push_i64(offset, backend)?;
        }
        for i in 0..self.dimensions.len() {
            let dimension = self.dimensions[i] as i64;
            self.write_buffer.push_i64(dimension, backend)?;
        }
        for i in 0..self.chunk_dimensions.len() {
            let chunk = self.chunk_dimensions[i] as i64;
            self.write_buffer.push_i64(chunk, backend)?;
        }
        self.write_buffer
            .push_i64(self.dimensions.len() as i64, backend)?;
        self.write_buffer.push_i64(lut_start, backend)?;
        self.write_buffer.flush(backend)?;
        Ok(())
    }

    fn validate_slab(
        &self,
        array: &[f32],
        array_dimensions: &[usize],
        array_read: &[Range<usize>],
    ) -> Result<()> {
        let rank = self.dimensions.len();
        if array_dimensions.len() != rank {
            return Err(Error::DimensionMismatch(format!(
                "array has {} dimensions, file has {}",
                array_dimensions.len(),
                rank
            )));
        }
        if array_read.len() != rank {
            return Err(Error::DimensionMismatch(format!(
                "read window has {} ranges, file has {} dimensions",
                array_read.len(),
                rank
            )));
        }
        let n_elements: usize = array_dimensions.iter().product();
        if array.len() != n_elements {
            return Err(Error::DimensionMismatch(format!(
                "array length {} does not match shape {:?}",
                array.len(),
                array_dimensions
            )));
        }
        for (axis, (range, &extent)) in array_read.iter().zip(array_dimensions).enumerate() {
            if range.end <= range.start || range.end > extent {
                return Err(Error::OutOfRange(format!(
                    "read range {}..{} invalid for extent {} on axis {}",
                    range.start, range.end, extent, axis
                )));
            }
        }
        for (axis, (range, &chunk)) in array_read.iter().zip(&self.chunk_dimensions).enumerate() {
            if range.start % chunk != 0 {
                return Err(Error::ChunkAlignment(format!(
                    "read start {} is not a multiple of chunk extent {} on axis {}",
                    range.start, chunk, axis
                )));
            }
        }
        Ok(())
    }

    /// Gathers, quantizes, delta-encodes and packs the chunk at
    /// `self.chunk_index`, whose source lies at call-grid position
    /// `c_offset` inside the current slab.
    fn write_next_chunk(
        &mut self,
        array: &[f32],
        array_dimensions: &[usize],
        array_read: &[Range<usize>],
        call_counts: &[usize],
        c_offset: usize,
    ) -> Result<()> {
        let rank = self.dimensions.len();
        let file_coords = decompose(self.chunk_index, &self.chunk_counts);
        let call_coords = decompose(c_offset, call_counts);

        let mut extents = vec![0_usize; rank];
        let mut origins = vec![0_usize; rank];
        for axis in 0..rank {
            let chunk = self.chunk_dimensions[axis];
            let chunk_start = file_coords[axis] * chunk;
            let extent = (chunk_start + chunk).min(self.dimensions[axis]) - chunk_start;
            let origin = array_read[axis].start + call_coords[axis] * chunk;
            let available = array_read[axis].end.min(origin + chunk) - origin;
            if available != extent {
                return Err(Error::DimensionMismatch(format!(
                    "read supplies {} elements for a chunk extent of {} on axis {}",
                    available, extent, axis
                )));
            }
            extents[axis] = extent;
            origins[axis] = origin;
        }

        let mut array_strides = vec![1_usize; rank];
        for axis in (0..rank - 1).rev() {
            array_strides[axis] = array_strides[axis + 1] * array_dimensions[axis + 1];
        }

        // A run stays contiguous in the source across an axis boundary only
        // while every faster axis is read in full.
        let mut split = rank - 1;
        while split > 0 && extents[split] == array_dimensions[split] {
            split -= 1;
        }
        let run_length: usize = extents[split..].iter().product();
        let n_elements: usize = extents.iter().product();

        let base: usize = origins
            .iter()
            .zip(&array_strides)
            .map(|(&origin, &stride)| origin * stride)
            .sum();

        let scale_factor = self.scale_factor;
        let compression = self.compression;
        let mut cursor = vec![0_usize; split];
        let mut gathered = 0;
        loop {
            let src = base
                + cursor
                    .iter()
                    .zip(&array_strides)
                    .map(|(&position, &stride)| position * stride)
                    .sum::<usize>();
            for step in 0..run_length {
                self.chunk_buffer[gathered + step] =
                    quantize(array[src + step], scale_factor, compression);
            }
            gathered += run_length;
            if gathered == n_elements {
                break;
            }
            let mut axis = split;
            while axis > 0 {
                axis -= 1;
                cursor[axis] += 1;
                if cursor[axis] < extents[axis] {
                    break;
                }
                cursor[axis] = 0;
            }
        }

        let n_columns = extents[rank - 1];
        delta2d_encode(
            n_elements / n_columns,
            n_columns,
            &mut self.chunk_buffer[..n_elements],
        );

        let bound = pack16_bound(n_elements);
        if self.write_buffer.remaining() < bound {
            return Err(Error::Io(io::Error::BufferTooSmall(format!(
                "packed chunk needs up to {} bytes, {} available",
                bound,
                self.write_buffer.remaining()
            ))));
        }
        let packed_length = pack16(&self.chunk_buffer[..n_elements], self.write_buffer.tail());
        self.write_buffer.advance(packed_length);

        self.chunk_offsets[self.chunk_index] =
            (self.write_buffer.total_bytes_written() - HEADER_SIZE) as u64;
        self.chunk_index += 1;
        Ok(())
    }
}

fn decompose(mut index: usize, counts: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; counts.len()];
    for axis in (0..counts.len()).rev() {
        coords[axis] = index % counts[axis];
        index /= counts[axis];
    }
    coords
}
