// Build script to refresh the precompiled GUI shaders
//
// glslc -> SPIR-V (Vulkan), fxc -> DXBC shader model 5.0 (D3D11 and D3D12).
// The compiled blobs are checked in next to their sources and embedded by
// src/backend/shader.rs, so a missing compiler only means they are not
// rebuilt.

use std::process::Command;

fn main() {
    for source in [
        "shaders/imgui.vert",
        "shaders/imgui.frag",
        "shaders/imgui_vs.hlsl",
        "shaders/imgui_ps.hlsl",
    ] {
        println!("cargo:rerun-if-changed={}", source);
    }

    // Vulkan
    compile(
        "glslc",
        &["-fshader-stage=vert", "shaders/imgui.vert", "-o"],
        "shaders/imgui.vert.spv",
    );
    compile(
        "glslc",
        &["-fshader-stage=frag", "shaders/imgui.frag", "-o"],
        "shaders/imgui.frag.spv",
    );

    // D3D11 and D3D12
    compile(
        "fxc",
        &["/nologo", "/Qstrip_reflect", "/T", "vs_5_0", "/E", "main", "shaders/imgui_vs.hlsl", "/Fo"],
        "shaders/imgui_vs.dxbc",
    );
    compile(
        "fxc",
        &["/nologo", "/Qstrip_reflect", "/T", "ps_5_0", "/E", "main", "shaders/imgui_ps.hlsl", "/Fo"],
        "shaders/imgui_ps.dxbc",
    );
}

/// Run `tool args... output`. Keeps the checked-in `output` if `tool` is missing.
fn compile(tool: &str, args: &[&str], output: &str) {
    let result = Command::new(tool).args(args).arg(output).status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} with {}", output, tool);
        }
        Ok(status) => {
            panic!("{} failed on {}: exit code {:?}", tool, output, status.code());
        }
        Err(e) => {
            eprintln!("Warning: {} not found ({})", tool, e);
            eprintln!("Using the precompiled {}", output);
        }
    }
}
