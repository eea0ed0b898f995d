//! Culling and draw shaders.
//!
//! Contains WGSL source for:
//! 1. Cull Shader - classifies instances and compacts survivors
//! 2. Draw Shader - draws the compacted set via `instance_index`
//!
//! ## Binding Layout
//!
//! ```text
//! cull (compute)                 draw (vertex)
//!   0: instances   storage r       0: camera    uniform
//!   1: camera      uniform         1: instances storage r
//!   2: draw_args   storage rw      2: visible   storage r
//!   3: visible     storage rw
//!   4: params      uniform
//! ```
//!
//! The workgroup size is substituted into the cull shader at pipeline
//! creation. The instance bound is read from `params` at dispatch time.

/// Entry point of the cull shader.
pub const CULL_ENTRY_POINT: &str = "cs_main";
/// Vertex entry point of the draw shader.
pub const DRAW_VS_ENTRY_POINT: &str = "vs_main";
/// Fragment entry point of the draw shader.
pub const DRAW_FS_ENTRY_POINT: &str = "fs_main";

const WORKGROUP_SIZE_TOKEN: &str = "{{WORKGROUP_SIZE}}";

/// Cull shader source for the given workgroup size.
#[must_use]
pub fn cull_shader_source(workgroup_size: u32) -> String {
    CULL_WGSL.replace(WORKGROUP_SIZE_TOKEN, &workgroup_size.to_string())
}

/// Draw shader source.
#[must_use]
pub const fn draw_shader_source() -> &'static str {
    DRAW_WGSL
}

const CULL_WGSL: &str = r"
struct Camera {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    planes: array<vec4<f32>, 6>,
};

struct CullParams {
    instance_count: u32,
    bounding_radius: f32,
    _pad0: u32,
    _pad1: u32,
};

struct DrawArgs {
    index_count: u32,
    instance_count: atomic<u32>,
    first_index: u32,
    base_vertex: i32,
    first_instance: u32,
};

@group(0) @binding(0) var<storage, read> instances: array<mat4x4<f32>>;
@group(0) @binding(1) var<uniform> camera: Camera;
@group(0) @binding(2) var<storage, read_write> draw_args: DrawArgs;
@group(0) @binding(3) var<storage, read_write> visible: array<u32>;
@group(0) @binding(4) var<uniform> params: CullParams;

@compute @workgroup_size({{WORKGROUP_SIZE}})
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let index = gid.x;
    if (index >= params.instance_count) {
        return;
    }

    let model = instances[index];
    let center = model[3].xyz;
    let scale = max(length(model[0].xyz), max(length(model[1].xyz), length(model[2].xyz)));
    let slack = params.bounding_radius * scale;

    for (var i = 0u; i < 6u; i = i + 1u) {
        let plane = camera.planes[i];
        if (dot(plane.xyz, center) + plane.w < -slack) {
            return;
        }
    }

    // The append counter is the draw count.
    let slot = atomicAdd(&draw_args.instance_count, 1u);
    visible[slot] = index;
}
";

const DRAW_WGSL: &str = r"
struct Camera {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    planes: array<vec4<f32>, 6>,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<storage, read> instances: array<mat4x4<f32>>;
@group(0) @binding(2) var<storage, read> visible: array<u32>;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) tint: vec3<f32>,
};

fn palette(index: u32) -> vec3<f32> {
    let h = f32(index % 7u) / 7.0;
    return vec3<f32>(0.5) + 0.5 * cos(6.28318 * (vec3<f32>(h) + vec3<f32>(0.0, 0.33, 0.67)));
}

@vertex
fn vs_main(in: VertexInput, @builtin(instance_index) instance: u32) -> VertexOutput {
    let index = visible[instance];
    let model = instances[index];

    var out: VertexOutput;
    out.clip = camera.proj * camera.view * model * vec4<f32>(in.position, 1.0);
    out.normal = (model * vec4<f32>(in.normal, 0.0)).xyz;
    out.tint = palette(index);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let light = normalize(vec3<f32>(0.4, 1.0, 0.3));
    let diffuse = max(dot(normalize(in.normal), light), 0.0);
    return vec4<f32>(in.tint * (0.2 + 0.8 * diffuse), 1.0);
}
";
