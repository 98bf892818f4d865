#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn should_render_clear_colour_around_a_triangle() {
    use cgmath::{Point3, Vector3};
    use gltf_viewer::{
        camera::{Camera, SceneFraming},
        capture::read_texture,
        context::Context,
        data_structures::{scene_graph::compute_scene_bounds, texture::Texture},
        render::{LightState, ShaderProgram, build_frame},
        resources::{gpu::GpuResources, sampler::SamplerState},
    };

    use crate::common::test_utils::triangle_document;

    const SIZE: u32 = 64;

    let document = triangle_document();
    let program = ShaderProgram::builtin_default().unwrap();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut ctx = runtime
        .block_on(Context::headless(SIZE, SIZE, &program))
        .unwrap();
    ctx.clear_colour = wgpu::Color::WHITE;

    let resources = GpuResources::build(&document, &SamplerState::default(), &mut ctx).unwrap();
    let framing = SceneFraming::new(compute_scene_bounds(&document).unwrap());
    let camera = Camera::new(
        Point3::new(0.25, 0.25, 1.0),
        Point3::new(0.25, 0.25, 0.0),
        Vector3::unit_y(),
    );
    let frame = build_frame(
        &document,
        &resources,
        program.uniforms(),
        &camera,
        &framing.projection(SIZE, SIZE).calc_matrix(),
        &LightState::default(),
    )
    .unwrap();
    assert_eq!(frame.draws.len(), 1);

    let target = Texture::create_render_target(&ctx.device, [SIZE, SIZE], ctx.color_format, "Test Target");
    ctx.render(&frame, &resources, &target.view);
    let image = runtime
        .block_on(read_texture(&ctx, &target.texture, SIZE, SIZE))
        .unwrap()
        .to_rgb8()
        .unwrap();

    assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255]);
    assert_eq!(image.get_pixel(SIZE - 1, SIZE - 1).0, [255, 255, 255]);
    // the triangle has no normals, so it is unlit
    assert_eq!(image.get_pixel(SIZE / 2, SIZE / 2).0, [0, 0, 0]);
}
