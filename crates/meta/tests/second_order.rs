//! Full-order gradient updates.
//!
//! candle only keeps gradient graphs when its environment switch is set
//! before the first backward pass, so these tests live in their own binary
//! and every test turns the switch on first.

use candle_core::{Device, Tensor, Var};
use metagrad::{
    enable_second_order, gradient_update_parameters, second_order_enabled, MetaLinear,
    MetaModule, MetaParams, StepSize, StepValue,
};

// Single weight w = 3 on input 1: the loss is w^2 and its gradient 2w.
fn scalar_model() -> MetaLinear {
    let weight = Var::new(&[[3.0f32]], &Device::Cpu).expect("weight");
    MetaLinear::from_vars(weight, None)
}

fn squared_output(model: &MetaLinear, params: Option<&MetaParams>) -> Tensor {
    let input = Tensor::new(&[[1.0f32]], &Device::Cpu).expect("input");
    model
        .forward_with(&input, params)
        .expect("forward")
        .sqr()
        .expect("sqr")
        .sum_all()
        .expect("sum")
}

fn adapt(model: &MetaLinear, steps: usize, first_order: bool) -> MetaParams {
    let step = StepSize::scalar(0.1);
    let mut params = model.meta_named_parameters();
    for _ in 0..steps {
        let loss = squared_output(model, Some(&params));
        params = gradient_update_parameters(model, &loss, Some(&params), &step, first_order)
            .expect("update");
    }
    params
}

fn weight_value(params: &MetaParams) -> f32 {
    params
        .tensor("weight")
        .expect("weight entry")
        .flatten_all()
        .expect("flatten")
        .to_vec1::<f32>()
        .expect("values")[0]
}

fn outer_gradient(model: &MetaLinear, adapted: &MetaParams) -> f32 {
    let outer = squared_output(model, Some(adapted));
    let grads = outer.backward().expect("backward");
    grads
        .get(model.weight())
        .expect("gradient for the original weight")
        .flatten_all()
        .expect("flatten")
        .to_vec1::<f32>()
        .expect("values")[0]
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "actual={} expected={}",
        actual,
        expected
    );
}

#[test]
fn switch_is_visible_after_enabling() {
    enable_second_order();
    assert!(second_order_enabled());
}

#[test]
fn full_order_update_differentiates_through_the_gradient() {
    enable_second_order();
    let model = scalar_model();
    let adapted = adapt(&model, 1, false);

    // w1 = w0 - 0.1 * 2 w0 = 2.4, dw1/dw0 = 0.8
    assert_close(weight_value(&adapted), 2.4);
    // d(w1^2)/dw0 = 2 * 2.4 * 0.8
    assert_close(outer_gradient(&model, &adapted), 3.84);
}

#[test]
fn first_order_update_treats_the_gradient_as_constant() {
    enable_second_order();
    let model = scalar_model();
    let adapted = adapt(&model, 1, true);

    assert_close(weight_value(&adapted), 2.4);
    // dw1/dw0 = 1
    assert_close(outer_gradient(&model, &adapted), 4.8);
}

#[test]
fn full_order_chains_across_several_steps() {
    enable_second_order();
    let model = scalar_model();

    let full = adapt(&model, 2, false);
    // w2 = 0.8^2 * 3 = 1.92, dw2/dw0 = 0.64
    assert_close(weight_value(&full), 1.92);
    assert_close(outer_gradient(&model, &full), 2.0 * 1.92 * 0.64);

    let first = adapt(&model, 2, true);
    assert_close(weight_value(&first), 1.92);
    assert_close(outer_gradient(&model, &first), 2.0 * 1.92);
}

#[test]
fn learned_step_size_receives_a_gradient() {
    enable_second_order();
    let model = scalar_model();
    let alpha = Var::new(&[0.1f32], &Device::Cpu).expect("alpha");
    let step = StepSize::Uniform(StepValue::Tensor(alpha.as_tensor().clone()));

    let loss = squared_output(&model, None);
    let adapted =
        gradient_update_parameters(&model, &loss, None, &step, false).expect("update");
    assert_close(weight_value(&adapted), 2.4);

    // d(w1^2)/dalpha = 2 * w1 * (-g) = 2 * 2.4 * -6
    let outer = squared_output(&model, Some(&adapted));
    let grads = outer.backward().expect("backward");
    let alpha_grad = grads.get(&alpha).expect("alpha gradient").to_vec1::<f32>().expect("values");
    assert_close(alpha_grad[0], -28.8);
}
