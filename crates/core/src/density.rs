use glam::{Affine3A, Mat3A, Vec3};
use thiserror::Error;

use crate::piece::{CsgMode, Sampler};
use crate::project::KernelSettings;
use crate::scene::{HierarchyVisitor, SceneObject};

/// Floats per inverse transform entry (4x3, column-major).
pub const TRANSFORM_STRIDE: usize = 12;

/// Smallest determinant, relative to the product of the basis lengths, a
/// transform may have before it counts as collapsed.
const SINGULAR_RATIO: f32 = 1.0e-6;

/// Shape helpers shared by every generated kernel. Each helper reads its
/// parameter words at the shape cursor and advances it past them.
pub const DENSITY_LIBRARY: &str = r#"float3 localPoint(__global const float* m, int* cursor, float3 p)
{
    int c = *cursor;
    *cursor = c + 12;
    return (float3)(
        m[c + 0] * p.x + m[c + 3] * p.y + m[c + 6] * p.z + m[c + 9],
        m[c + 1] * p.x + m[c + 4] * p.y + m[c + 7] * p.z + m[c + 10],
        m[c + 2] * p.x + m[c + 5] * p.y + m[c + 8] * p.z + m[c + 11]);
}

float readFloat(__global const uint* data, int* cursor)
{
    float v = as_float(data[*cursor]);
    *cursor += 1;
    return v;
}

float3 readFloat3(__global const uint* data, int* cursor)
{
    float x = readFloat(data, cursor);
    float y = readFloat(data, cursor);
    float z = readFloat(data, cursor);
    return (float3)(x, y, z);
}

float capsuleDistance(float3 p, float3 a, float3 b, float* t)
{
    float3 ab = b - a;
    float lenSq = dot(ab, ab);
    *t = lenSq > 0.0f ? clamp(dot(p - a, ab) / lenSq, 0.0f, 1.0f) : 0.0f;
    return length(p - (a + ab * (*t)));
}

float sdSphere(__global const uint* data, int* cursor, float3 p)
{
    float r = readFloat(data, cursor);
    return r - length(p);
}

float sdBox(__global const uint* data, int* cursor, float3 p)
{
    float3 q = fabs(p) - readFloat3(data, cursor);
    return -(length(fmax(q, (float3)(0.0f))) + fmin(fmax(q.x, fmax(q.y, q.z)), 0.0f));
}

float sdTorus(__global const uint* data, int* cursor, float3 p)
{
    float major = readFloat(data, cursor);
    float minor = readFloat(data, cursor);
    float2 q = (float2)(length(p.xz) - major, p.y);
    return minor - length(q);
}

float sdCapsule(__global const uint* data, int* cursor, float3 p)
{
    float3 a = readFloat3(data, cursor);
    float3 b = readFloat3(data, cursor);
    float r = readFloat(data, cursor);
    float t;
    return r - capsuleDistance(p, a, b, &t);
}

float sdSegmentChain(__global const uint* data, int* cursor, float3 p)
{
    int count = (int)data[*cursor];
    *cursor += 1;
    float3 a = readFloat3(data, cursor);
    float ra = readFloat(data, cursor);
    float d = -INFINITY;
    for (int i = 1; i < count; ++i) {
        float3 b = readFloat3(data, cursor);
        float rb = readFloat(data, cursor);
        float t;
        float dist = capsuleDistance(p, a, b, &t);
        d = fmax(d, mix(ra, rb, t) - dist);
        a = b;
        ra = rb;
    }
    return d;
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerState {
    Idle,
    Traversing,
    Finished,
}

#[derive(Debug, Error, PartialEq)]
pub enum ComposeError {
    #[error("composer already finished")]
    AlreadyFinished,
    #[error("invalid kernel identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("empty density {0} is not finite")]
    NonFiniteEmptyDensity(f32),
}

/// Where one contributing piece's data lives in the flat buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct PieceBlock {
    pub name: String,
    pub mode: CsgMode,
    pub shape_offset: usize,
    pub shape_len: usize,
    pub transform_offset: usize,
}

#[derive(Debug, Clone)]
struct Term {
    mode: CsgMode,
    sampler: Sampler,
    inverse: Affine3A,
}

/// Finished composition: kernel text plus the buffers it reads.
#[derive(Debug, Clone)]
pub struct DensityKernel {
    pub function_name: String,
    pub source: String,
    pub body: String,
    pub shape_data: Vec<u32>,
    pub transform_data: Vec<f32>,
    pub blocks: Vec<PieceBlock>,
    empty_density: f32,
    terms: Vec<Term>,
}

impl DensityKernel {
    pub fn shape_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.shape_data)
    }

    pub fn transform_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.transform_data)
    }

    pub fn piece_count(&self) -> usize {
        self.blocks.len()
    }

    /// Evaluates the composed density on the CPU. `None` when a custom
    /// expression takes part, since its text cannot be run here.
    pub fn sample(&self, p: Vec3) -> Option<f32> {
        let mut terms = self.terms.iter();
        let Some(first) = terms.next() else {
            return Some(self.empty_density);
        };
        let mut density = first.sampler.density(first.inverse.transform_point3(p))?;
        for term in terms {
            let value = term.sampler.density(term.inverse.transform_point3(p))?;
            density = term.mode.combine(density, value);
        }
        Some(density)
    }

    pub fn is_cpu_evaluable(&self) -> bool {
        !self
            .terms
            .iter()
            .any(|term| matches!(term.sampler, Sampler::Opaque))
    }
}

/// Composes CSG pieces met during a hierarchy walk into density kernel code.
pub trait DensityShaderBuilder: HierarchyVisitor {
    fn state(&self) -> ComposerState;

    /// Accumulated body statements so far.
    fn code(&self) -> String;

    /// Wraps the body into the kernel function. Valid once.
    fn finish(&mut self) -> Result<DensityKernel, ComposeError>;
}

/// Emits OpenCL C.
#[derive(Debug)]
pub struct OpenClDensityBuilder {
    settings: KernelSettings,
    state: ComposerState,
    statements: Vec<String>,
    shape_data: Vec<u32>,
    transform_data: Vec<f32>,
    blocks: Vec<PieceBlock>,
    terms: Vec<Term>,
    /// False after a custom expression, which leaves both cursors where it
    /// found them.
    cursors_in_sync: bool,
}

impl OpenClDensityBuilder {
    pub fn new(settings: KernelSettings) -> Self {
        Self {
            settings,
            state: ComposerState::Idle,
            statements: Vec::new(),
            shape_data: Vec::new(),
            transform_data: Vec::new(),
            blocks: Vec::new(),
            terms: Vec::new(),
            cursors_in_sync: true,
        }
    }

    fn combinator(&self, mode: CsgMode) -> &str {
        match mode {
            CsgMode::Additive => &self.settings.union_name,
            CsgMode::Subtractive => &self.settings.subtract_name,
            CsgMode::Intersection => &self.settings.intersect_name,
        }
    }

    fn accumulate(&mut self, object: &SceneObject, world: &Affine3A) {
        let Some(piece) = &object.piece else {
            return;
        };
        let Some(encoded) = piece.shape.encode() else {
            tracing::debug!("skipping degenerate piece {}", object.name);
            return;
        };
        if is_singular(&world.matrix3) {
            tracing::debug!("skipping piece {} with singular transform", object.name);
            return;
        }
        let inverse = world.inverse();
        let columns = inverse.to_cols_array();
        if columns.iter().any(|v| !v.is_finite()) {
            tracing::debug!("skipping piece {} with non-finite transform", object.name);
            return;
        }

        let opaque = matches!(encoded.sampler, Sampler::Opaque);
        if !opaque && !self.cursors_in_sync {
            self.statements.push(format!(
                "shapeCursor = {}; transformCursor = {};",
                self.shape_data.len(),
                self.transform_data.len()
            ));
        }
        self.cursors_in_sync = !opaque;

        let statement = if self.terms.is_empty() {
            format!("float density = {};", encoded.expression)
        } else {
            format!(
                "density = {}(density, {});",
                self.combinator(piece.mode),
                encoded.expression
            )
        };
        tracing::debug!("piece {} ({:?}): {}", object.name, piece.mode, statement);
        self.statements.push(statement);

        self.blocks.push(PieceBlock {
            name: object.name.clone(),
            mode: piece.mode,
            shape_offset: self.shape_data.len(),
            shape_len: encoded.params.len(),
            transform_offset: self.transform_data.len(),
        });
        self.shape_data.extend(encoded.params);
        self.transform_data.extend_from_slice(&columns);
        self.terms.push(Term {
            mode: piece.mode,
            sampler: encoded.sampler,
            inverse,
        });
    }

    fn check_settings(&self) -> Result<(), ComposeError> {
        if !self.settings.empty_density.is_finite() {
            return Err(ComposeError::NonFiniteEmptyDensity(
                self.settings.empty_density,
            ));
        }
        let names = [
            &self.settings.function_name,
            &self.settings.union_name,
            &self.settings.subtract_name,
            &self.settings.intersect_name,
        ];
        for name in names {
            if !is_identifier(name) {
                return Err(ComposeError::InvalidIdentifier(name.clone()));
            }
        }
        Ok(())
    }

    fn combinator_library(&self) -> String {
        format!(
            "float {}(float a, float b) {{ return fmax(a, b); }}\n\
             float {}(float a, float b) {{ return fmin(a, -b); }}\n\
             float {}(float a, float b) {{ return fmin(a, b); }}\n",
            self.settings.union_name, self.settings.subtract_name, self.settings.intersect_name
        )
    }
}

impl HierarchyVisitor for OpenClDensityBuilder {
    fn visit(&mut self, object: &SceneObject, world: &Affine3A) {
        match self.state {
            ComposerState::Finished => {
                tracing::warn!("ignoring {} visited after finish", object.name);
            }
            ComposerState::Idle | ComposerState::Traversing => {
                self.state = ComposerState::Traversing;
                self.accumulate(object, world);
            }
        }
    }
}

impl DensityShaderBuilder for OpenClDensityBuilder {
    fn state(&self) -> ComposerState {
        self.state
    }

    fn code(&self) -> String {
        self.statements.join(" ")
    }

    fn finish(&mut self) -> Result<DensityKernel, ComposeError> {
        if self.state == ComposerState::Finished {
            return Err(ComposeError::AlreadyFinished);
        }
        self.check_settings()?;
        self.state = ComposerState::Finished;

        let body = if self.terms.is_empty() {
            format!("float density = {:?}f;", self.settings.empty_density)
        } else {
            self.code()
        };

        let mut source = String::new();
        if self.settings.include_library {
            source.push_str(DENSITY_LIBRARY);
            source.push('\n');
            source.push_str(&self.combinator_library());
            source.push('\n');
        }
        source.push_str(&format!(
            "float {}(float3 p, __global const uint* shapeData, __global const float* transformData)\n\
             {{\n    int shapeCursor = 0;\n    int transformCursor = 0;\n    {}\n    return density;\n}}\n",
            self.settings.function_name, body
        ));

        tracing::info!(
            "density kernel finished: {} pieces, {} shape words",
            self.blocks.len(),
            self.shape_data.len()
        );

        Ok(DensityKernel {
            function_name: self.settings.function_name.clone(),
            source,
            body,
            shape_data: std::mem::take(&mut self.shape_data),
            transform_data: std::mem::take(&mut self.transform_data),
            blocks: std::mem::take(&mut self.blocks),
            empty_density: self.settings.empty_density,
            terms: std::mem::take(&mut self.terms),
        })
    }
}

fn is_singular(matrix: &Mat3A) -> bool {
    let scale = matrix.x_axis.length() * matrix.y_axis.length() * matrix.z_axis.length();
    if !(scale.is_finite() && scale > 0.0) {
        return true;
    }
    (matrix.determinant() / scale).abs() <= SINGULAR_RATIO
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn build_density_kernel(
    scene: &SceneObject,
    settings: &KernelSettings,
) -> Result<DensityKernel, ComposeError> {
    let mut builder = OpenClDensityBuilder::new(settings.clone());
    scene.walk(&mut builder);
    builder.finish()
}
