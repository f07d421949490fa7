/// WGSL source for every fusion kernel.
///
/// `Params` mirrors `FusionUniforms` field for field. The volume is
/// ping-ponged: kernels read `prev_volume` and write `next_volume`.
pub const FUSION_SHADER: &str = r#"
const MAX_CAMERAS: u32 = 8u;
const MAX_OBJECTS: u32 = 100u;
const DECAY_REFERENCE_HZ: f32 = 60.0;

struct Params {
    grid_min: vec3<f32>,
    num_cameras: u32,
    grid_max: vec3<f32>,
    num_objects: u32,
    resolution: vec3<u32>,
    decay_rate: f32,
    output_size: vec2<u32>,
    delta_time: f32,
    cos_half_fov: f32,
    max_range: f32,
    object_radius: f32,
    ambient_weight: f32,
    time: f32,
    camera_positions: array<vec4<f32>, 8>,
    camera_forwards: array<vec4<f32>, 8>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var prev_volume: texture_3d<f32>;
@group(0) @binding(2) var next_volume: texture_storage_3d<r32float, write>;
@group(0) @binding(3) var<storage, read> objects: array<vec4<f32>, 100>;
@group(0) @binding(4) var result: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(5) var depth0: texture_2d<f32>;
@group(0) @binding(6) var depth1: texture_2d<f32>;
@group(0) @binding(7) var depth2: texture_2d<f32>;
@group(0) @binding(8) var depth3: texture_2d<f32>;
@group(0) @binding(9) var depth4: texture_2d<f32>;
@group(0) @binding(10) var depth5: texture_2d<f32>;
@group(0) @binding(11) var depth6: texture_2d<f32>;
@group(0) @binding(12) var depth7: texture_2d<f32>;

fn voxel_center(id: vec3<u32>) -> vec3<f32> {
    let res = vec3<f32>(max(params.resolution, vec3<u32>(1u)));
    return params.grid_min + (vec3<f32>(id) + 0.5) * (params.grid_max - params.grid_min) / res;
}

@compute @workgroup_size(8, 8, 8)
fn clear_voxels(@builtin(global_invocation_id) id: vec3<u32>) {
    if any(id >= params.resolution) {
        return;
    }
    textureStore(next_volume, id, vec4<f32>(0.0));
}

@compute @workgroup_size(8, 8, 8)
fn update_voxels(@builtin(global_invocation_id) id: vec3<u32>) {
    if any(id >= params.resolution) {
        return;
    }
    let center = voxel_center(id);
    let old = textureLoad(prev_volume, id, 0).r;

    let num_cameras = min(params.num_cameras, MAX_CAMERAS);
    var seen = 0u;
    for (var i = 0u; i < num_cameras; i = i + 1u) {
        let d = center - params.camera_positions[i].xyz;
        let dist = length(d);
        if dist > 1e-5 && dist <= params.max_range
            && dot(d / dist, params.camera_forwards[i].xyz) >= params.cos_half_fov {
            seen = seen + 1u;
        }
    }
    var visibility = 0.0;
    if num_cameras > 0u {
        visibility = f32(seen) / f32(num_cameras);
    }

    let num_objects = min(params.num_objects, MAX_OBJECTS);
    var occupancy = 0.0;
    if params.object_radius > 0.0 {
        for (var i = 0u; i < num_objects; i = i + 1u) {
            let dist = distance(center, objects[i].xyz);
            occupancy = max(occupancy, clamp(1.0 - dist / params.object_radius, 0.0, 1.0));
        }
    }

    let contribution = visibility * max(params.ambient_weight, occupancy);
    let dt = params.delta_time;
    let decay = params.decay_rate;
    var value = old;
    if dt > 0.0 {
        if decay <= 0.0 {
            value = old + contribution * dt;
        } else {
            var keep = 0.0;
            if decay < 1.0 {
                keep = pow(1.0 - decay, dt * DECAY_REFERENCE_HZ);
            }
            value = old * keep + contribution * (1.0 - keep);
        }
    }
    textureStore(next_volume, id, vec4<f32>(clamp(value, 0.0, 1.0), 0.0, 0.0, 0.0));
}

@compute @workgroup_size(8, 8, 1)
fn visualize_top_down(@builtin(global_invocation_id) id: vec3<u32>) {
    let out = params.output_size;
    if id.x >= out.x || id.y >= out.y {
        return;
    }
    let res = params.resolution;
    let vx = id.x * res.x / out.x;
    let vz = id.y * res.z / out.y;
    var column_max = 0.0;
    for (var vy = 0u; vy < res.y; vy = vy + 1u) {
        column_max = max(column_max, textureLoad(prev_volume, vec3<u32>(vx, vy, vz), 0).r);
    }
    let base = vec3<f32>(0.05, 0.05, 0.12);
    let hot = vec3<f32>(1.0, 0.35, 0.05);
    let c = mix(base, hot, clamp(column_max, 0.0, 1.0));
    textureStore(result, id.xy, vec4<f32>(c, 1.0));
}

fn sample_depth(slot: u32, id: vec2<u32>) -> f32 {
    var dims: vec2<u32>;
    var d = 0.0;
    switch slot {
        case 0u: { dims = textureDimensions(depth0); d = textureLoad(depth0, id * dims / params.output_size, 0).r; }
        case 1u: { dims = textureDimensions(depth1); d = textureLoad(depth1, id * dims / params.output_size, 0).r; }
        case 2u: { dims = textureDimensions(depth2); d = textureLoad(depth2, id * dims / params.output_size, 0).r; }
        case 3u: { dims = textureDimensions(depth3); d = textureLoad(depth3, id * dims / params.output_size, 0).r; }
        case 4u: { dims = textureDimensions(depth4); d = textureLoad(depth4, id * dims / params.output_size, 0).r; }
        case 5u: { dims = textureDimensions(depth5); d = textureLoad(depth5, id * dims / params.output_size, 0).r; }
        case 6u: { dims = textureDimensions(depth6); d = textureLoad(depth6, id * dims / params.output_size, 0).r; }
        default: { dims = textureDimensions(depth7); d = textureLoad(depth7, id * dims / params.output_size, 0).r; }
    }
    return d;
}

@compute @workgroup_size(8, 8, 1)
fn fuse_depth(@builtin(global_invocation_id) id: vec3<u32>) {
    let out = params.output_size;
    if id.x >= out.x || id.y >= out.y {
        return;
    }
    let n = min(params.num_cameras, MAX_CAMERAS);
    var covered = 0u;
    var nearest = 3.4e38;
    for (var i = 0u; i < n; i = i + 1u) {
        let d = sample_depth(i, id.xy);
        // Misses are stored as +inf, which fails the range test.
        if d <= params.max_range {
            covered = covered + 1u;
            nearest = min(nearest, d);
        }
    }
    var coverage = 0.0;
    if n > 0u {
        coverage = f32(covered) / f32(n);
    }
    var nearness = 0.0;
    if covered > 0u && params.max_range > 0.0 {
        nearness = 1.0 - nearest / params.max_range;
    }
    textureStore(result, id.xy, vec4<f32>(coverage, nearness, 0.1 * (1.0 - coverage), 1.0));
}

@compute @workgroup_size(8, 8, 1)
fn test_pattern(@builtin(global_invocation_id) id: vec3<u32>) {
    let out = params.output_size;
    if id.x >= out.x || id.y >= out.y {
        return;
    }
    let s = vec2<f32>(max(out, vec2<u32>(1u)));
    let uv = vec2<f32>(id.xy) / s;
    textureStore(result, id.xy, vec4<f32>(uv, 0.5 + 0.5 * sin(params.time), 1.0));
}
"#;
