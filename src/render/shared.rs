/// Instanced disk shader. Each instance reads its center and scale from
/// `frame_buffer` and its color from `colors_buffer`.
pub(crate) const SHADER: &str = r#"
struct Globals {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    transform: mat4x4<f32>,
    // x: disk size, y: 1.0 when disk size overrides per-point scale
    disk: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var<storage, read> frame_buffer: array<vec4<f32>>;

@group(1) @binding(1)
var<storage, read> colors_buffer: array<vec4<f32>>;

struct VertexInput {
    @location(0) corner: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @builtin(instance_index) instance: u32,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    let point = frame_buffer[input.instance];
    let size = select(point.w, globals.disk.x, globals.disk.y > 0.5);
    let center = globals.view * globals.transform * vec4<f32>(point.xyz, 1.0);
    let corner = center + vec4<f32>(input.corner * size, 0.0, 0.0);

    var out: VertexOutput;
    out.position = globals.projection * corner;
    out.uv = input.uv;
    out.color = colors_buffer[input.instance];
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let offset = input.uv - vec2<f32>(0.5, 0.5);
    if dot(offset, offset) > 0.25 {
        discard;
    }
    return input.color;
}
"#;
