/// Instanced voxel cubes: directional shading plus darkened edges so
/// neighbouring voxels stay distinguishable.
pub const VOXEL_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
    @location(6) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) local: vec3<f32>,
    @location(2) color: vec4<f32>,
};

@vertex
fn vs_voxel(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
    var out: VertexOutput;
    out.clip_position = camera.view_proj * model * vec4<f32>(vertex.position, 1.0);
    out.world_normal = (model * vec4<f32>(vertex.normal, 0.0)).xyz;
    out.local = vertex.position;
    out.color = instance.color;
    return out;
}

@fragment
fn fs_voxel(in: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(vec3<f32>(0.4, 1.0, 0.3));
    let diffuse = max(dot(normalize(in.world_normal), light_dir), 0.0);
    let lighting = 0.45 + diffuse * 0.55;

    // Distance to the nearest face edge in cube-local units (faces at +-0.5).
    let a = abs(in.local) * 2.0;
    let inner = min(min(max(a.x, a.y), max(a.y, a.z)), max(a.x, a.z));
    let edge = smoothstep(0.85, 0.95, inner);
    let shade = mix(1.0, 0.55, edge);
    return vec4<f32>(in.color.rgb * lighting * shade, in.color.a);
}
"#;

/// Unlit coloured lines: floor grid, bounds, frustum rays, markers.
pub const LINE_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

struct LineVertex {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct LineOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) world: vec3<f32>,
};

@vertex
fn vs_line(vertex: LineVertex) -> LineOutput {
    var out: LineOutput;
    out.clip_position = camera.view_proj * vec4<f32>(vertex.position, 1.0);
    out.color = vertex.color;
    out.world = vertex.position;
    return out;
}

@fragment
fn fs_line(in: LineOutput) -> @location(0) vec4<f32> {
    // Fade distant lines so the floor grid does not swamp the arena.
    let d = distance(in.world, camera.eye.xyz);
    let fade = clamp(1.0 - d / 60.0, 0.2, 1.0);
    return vec4<f32>(in.color.rgb * fade, in.color.a);
}
"#;
